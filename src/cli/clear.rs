use crate::error::Result;

use super::open_store;

pub fn run() -> Result<()> {
    let mut store = open_store()?;
    let count = store.snapshot().positions.len();
    store.clear();
    println!("Cleared {count} positions.");
    Ok(())
}
