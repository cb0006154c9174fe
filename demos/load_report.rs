use std::time::Instant;

use chain_hash::HashTable;
use clap::Parser;
use rand::Rng;
use rand::SeedableRng;
use rand::TryRngCore;
use rand::rngs::OsRng;
use rand::rngs::SmallRng;
use tracing_subscriber::EnvFilter;

/// Fills the table with random words round by round, one order of magnitude
/// per round, and reports timings, occupancy statistics, and a bucket dump.
#[derive(Parser, Debug)]
struct Args {
    /// Number of rounds; round `i` inserts 10^i words.
    #[arg(short = 'o', long = "orders", default_value_t = 4)]
    orders: u32,

    /// Length of each generated word.
    #[arg(short = 'w', long = "word-len", default_value_t = 6)]
    word_len: usize,

    /// Lookups performed per round.
    #[arg(short = 'l', long = "lookups", default_value_t = 10_000)]
    lookups: usize,
}

fn random_word(rng: &mut SmallRng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'A' + rng.random_range(0..26u8)))
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut rng = SmallRng::seed_from_u64(OsRng.try_next_u64().expect("OS rng unavailable"));

    let mut table: HashTable<u32> = HashTable::new();

    for order in 1..=args.orders {
        println!("--------------------------------");
        println!("Round {order}");

        let n = 10usize.pow(order);
        let start = Instant::now();
        for _ in 0..n {
            let key = random_word(&mut rng, args.word_len);
            table.insert(&key, rng.random_range(0..10_000));
        }
        let inserting = start.elapsed();
        println!("Inserted {n} words in {inserting:?}");
        table.stats().print();
        println!("{}", table.render(8));

        let mut hits = 0;
        let start = Instant::now();
        for _ in 0..args.lookups {
            let key = random_word(&mut rng, args.word_len);
            if table.get(&key).is_some() {
                hits += 1;
            }
        }
        let looking_up = start.elapsed();
        println!(
            "Looked up {} words in {looking_up:?} ({hits} hits)",
            args.lookups
        );
        println!("Total: {:?}", inserting + looking_up);

        table.clear();
    }
}
