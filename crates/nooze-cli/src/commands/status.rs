use nooze_core::EnforcementStore;

/// Print every persisted enforcement field as JSON.
pub fn status() -> Result<(), Box<dyn std::error::Error>> {
    let store = EnforcementStore::open()?;
    let json = serde_json::to_string_pretty(&store.snapshot()?)?;
    println!("{json}");
    Ok(())
}

/// Take the completion record; a second call prints `null`.
pub fn consume() -> Result<(), Box<dyn std::error::Error>> {
    let store = EnforcementStore::open()?;
    let json = serde_json::to_string(&store.consume_completion()?)?;
    println!("{json}");
    Ok(())
}
