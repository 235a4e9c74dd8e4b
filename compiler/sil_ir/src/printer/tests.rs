use pretty_assertions::assert_eq;

use crate::{ArgConvention, Function, OwnershipKind, SideEffects, SilType, SymbolTable};

#[test]
fn prints_blocks_and_instructions() {
    let symbols = SymbolTable::new();
    let c = symbols.intern("C");
    let mut func = Function::new(symbols.intern("f"), true);
    let x = func.add_argument(SilType::Ref(c), ArgConvention::Guaranteed);
    let bb1 = func.create_block();
    let phi = func.add_block_arg(bb1, SilType::Ref(c), OwnershipKind::Owned);
    let mut b = func.builder(func.entry());
    let obj = b.alloc_ref(c);
    b.strong_retain(obj);
    b.call(
        symbols.intern("g"),
        &[(x, ArgConvention::Guaranteed)],
        SideEffects::ReadOnly,
    );
    b.br(bb1, &[obj]);
    b.position_at_end(bb1);
    b.strong_release(phi);
    b.return_(None);

    let expected = "\
sil [ossa] @f {
bb0(%0 : @guaranteed $C):
  %2 = alloc_ref $C
  strong_retain %2
  apply @g(%0 @guaranteed) [readonly]
  br bb1(%2)
bb1(%1 : @owned $C):
  strong_release %1
  return
}";
    assert_eq!(func.display(&symbols).to_string(), expected);
}

#[test]
fn prints_raw_names_without_symbols() {
    let symbols = SymbolTable::new();
    let func = Function::new(symbols.intern("h"), false);
    assert_eq!(func.to_string(), "sil @sym3 {\nbb0:\n  unreachable\n}");
}
