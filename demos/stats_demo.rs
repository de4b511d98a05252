use std::hash::BuildHasher;

use clap::Parser;
use mainpos_hash::HashTable;
use mainpos_hash::hash_table::Entry;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Maximum load factor to run the table at.
    #[arg(short = 'l', long = "load_factor")]
    load_factor: Option<f32>,

    /// Remove every n-th value after filling, to show compaction.
    #[arg(short = 'r', long = "remove_every")]
    remove_every: Option<usize>,
}

fn main() {
    let args = Args::parse();
    let state = std::hash::RandomState::new();
    let hash_u64 = |value: &u64| state.hash_one(value);

    let mut table: HashTable<u64> = HashTable::new();
    if let Some(load_factor) = args.load_factor {
        table.set_max_load_factor(load_factor, hash_u64);
    }
    table.reserve(args.target_capacity, hash_u64);

    println!(
        "Target capacity {}: {} buckets, room for {} values (max load {:.2})",
        args.target_capacity,
        table.bucket_count(),
        table.capacity(),
        table.max_load_factor()
    );

    let fill = table.capacity() as u64;
    for value in 0..fill {
        match table.entry(hash_u64(&value), |&v| v == value, hash_u64) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(_) => panic!("value already present: {value}"),
        }
    }

    println!(
        "Inserted {} values, load factor {:.2}%",
        table.len(),
        table.load_factor() * 100.0
    );
    table.stats(hash_u64).print();

    if let Some(every) = args.remove_every.filter(|&n| n > 0) {
        table.retain(|v| *v % every as u64 != 0, hash_u64);
        println!("After removing every {every}th value:");
        table.stats(hash_u64).print();
    }
}
