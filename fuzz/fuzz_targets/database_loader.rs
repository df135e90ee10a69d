#![no_main]

use libfuzzer_sys::fuzz_target;
use riglib_db::RigDatabase;

fuzz_target!(|data: &[u8]| {
    let Ok(database) = serde_json::from_slice::<RigDatabase>(data) else {
        return;
    };
    let written = serde_json::to_vec(&database).unwrap();
    let reread: RigDatabase = serde_json::from_slice(&written).unwrap();
    assert_eq!(reread.records.len(), database.records.len());
});
