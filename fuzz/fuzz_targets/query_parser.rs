#![no_main]

use std::collections::HashSet;

use libfuzzer_sys::fuzz_target;
use riglib_browser::{filter_names, ParsedQuery};
use riglib_db::{FilterSelection, RigMap, RigRecord};

fuzz_target!(|text: &str| {
    let query = ParsedQuery::parse(text);
    assert!(query.general.iter().all(|term| !term.is_empty()));

    let mut records = RigMap::new();
    records.insert(text.to_owned(), RigRecord::new(text).with_tags([text]));
    let first = filter_names(&records, text, &FilterSelection::default(), &HashSet::new());
    let second = filter_names(&records, text, &FilterSelection::default(), &HashSet::new());
    assert_eq!(first, second);
});
