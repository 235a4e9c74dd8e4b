use super::*;

#[test]
fn test_intern_and_lookup() {
    let symbols = SymbolTable::new();

    let hello = symbols.intern("hello");
    let world = symbols.intern("world");
    let hello2 = symbols.intern("hello");

    assert_eq!(hello, hello2);
    assert_ne!(hello, world);

    assert_eq!(symbols.lookup(hello), "hello");
    assert_eq!(symbols.lookup(world), "world");
}

#[test]
fn test_empty_string() {
    let symbols = SymbolTable::new();
    assert_eq!(symbols.intern(""), Name::EMPTY);
    assert_eq!(symbols.lookup(Name::EMPTY), "");
}

#[test]
fn test_pool_symbols_pre_interned() {
    let symbols = SymbolTable::new();
    assert_eq!(
        symbols.intern("objc_autoreleasePoolPush"),
        Name::AUTORELEASE_POOL_PUSH
    );
    assert_eq!(
        symbols.intern("objc_autoreleasePoolPop"),
        Name::AUTORELEASE_POOL_POP
    );
    assert!(symbols.is_empty());
}

#[test]
fn test_pool_match_is_exact() {
    let symbols = SymbolTable::new();
    let near_miss = symbols.intern("objc_autoreleasePoolPushX");
    assert!(!near_miss.is_autorelease_pool_call());
    assert!(!symbols.is_empty());
}

#[test]
fn test_get_does_not_intern() {
    let symbols = SymbolTable::new();
    assert_eq!(symbols.get("missing"), None);
    assert_eq!(symbols.len(), 3);
    let name = symbols.intern("missing");
    assert_eq!(symbols.get("missing"), Some(name));
}

#[test]
fn test_lookup_foreign_name() {
    let symbols = SymbolTable::new();
    assert_eq!(symbols.lookup(Name::from_raw(999)), "<unknown>");
}

#[test]
fn test_concurrent_interning() {
    let symbols = SymbolTable::new();
    let names: Vec<Name> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| symbols.intern("shared")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(names.windows(2).all(|w| w[0] == w[1]));
}
