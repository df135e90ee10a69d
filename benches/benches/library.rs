use std::collections::HashSet;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use riglib_browser::{CardFactory, Grid, SearchFilter};
use riglib_db::{
    Blacklist, CancelToken, FilterCategory, FilterSelection, RigMap, RigRecord, SortKey,
};

const AUTHORS: [&str; 4] = ["Ramon", "Ana", "Empty", "Kiko"];
const TAGS: [&str; 6] = ["human", "male", "female", "creature", "prop", "stylized"];

fn catalog(size: usize) -> RigMap {
    (0..size)
        .map(|index| {
            let record = RigRecord::new(format!("/rigs/set_{}/Rig_{index:05}.ma", index % 40))
                .with_tags([TAGS[index % TAGS.len()], TAGS[(index / 3) % TAGS.len()]])
                .with_author(AUTHORS[index % AUTHORS.len()])
                .with_collection(format!("Collection {}", index % 25));
            (format!("Rig {index:05}"), record)
        })
        .collect()
}

fn search_5k(c: &mut Criterion) {
    let records = catalog(5_000);
    let mut group = c.benchmark_group("search");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("query_and_tag_filter_5k", |b| {
        let selection = FilterSelection::single(FilterCategory::Tags, "creature");
        let filter = SearchFilter::new("rig 01 a:ra", selection, HashSet::new());
        let cancel = CancelToken::new();
        b.iter(|| filter.run(&records, &cancel));
    });

    group.finish();
}

fn reconcile_5k(c: &mut Criterion) {
    let records = catalog(5_000);
    let blacklist = Blacklist::default();
    let mut group = c.benchmark_group("grid");
    group.sample_size(20);

    group.bench_function("reconcile_by_author_5k", |b| {
        let mut grid = Grid::new();
        let mut cards = CardFactory::new("images");
        b.iter(|| grid.reconcile(&records, &blacklist, SortKey::Author, true, &mut cards));
    });

    group.finish();
}

criterion_group!(benches, search_5k, reconcile_5k);
criterion_main!(benches);
