use std::borrow::Borrow;
use std::cmp::Ordering;

use riglib_db::{RigRecord, SortKey};

/// Pushes unset collection and author values behind every real value.
const UNSET_SORT_VALUE: &str = "\u{ffff}";

fn field_value(record: &RigRecord, key: SortKey) -> String {
    let value = match key {
        SortKey::Name => return String::new(),
        SortKey::Collection => record.collection(),
        SortKey::Author => record.author(),
    };
    value.map_or_else(|| UNSET_SORT_VALUE.to_owned(), str::to_lowercase)
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Orders `(name, record)` pairs for the grid.
///
/// Names compare case-insensitively with the exact name as a tiebreak, so
/// the order is total. For collection and author the field value leads and
/// unset values stay last whichever way the sort runs.
pub fn sort_entries<T>(entries: &mut [(String, T)], key: SortKey, ascending: bool)
where
    T: Borrow<RigRecord>,
{
    let directed = |ordering: Ordering| if ascending { ordering } else { ordering.reverse() };
    entries.sort_by(|(name_a, a), (name_b, b)| {
        if key == SortKey::Name {
            return directed(compare_names(name_a, name_b));
        }
        let value_a = field_value(<T as Borrow<RigRecord>>::borrow(a), key);
        let value_b = field_value(<T as Borrow<RigRecord>>::borrow(b), key);
        let unset_a = value_a == UNSET_SORT_VALUE;
        let unset_b = value_b == UNSET_SORT_VALUE;
        unset_a
            .cmp(&unset_b)
            .then_with(|| directed(value_a.cmp(&value_b)))
            .then_with(|| directed(compare_names(name_a, name_b)))
    });
}
