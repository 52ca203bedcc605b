mod common;

use std::sync::Arc;
use std::thread;

use common::{incr, select_algorithm, sum, tx_read, tx_write, SharedWords};
use petek::abi;
use petek::atomically;
use rand::Rng;

const ALG: &str = "PipelineTurbo";

#[test]
fn single_thread_runs_turbo() {
    select_algorithm(ALG);
    let words = Arc::new(SharedWords::new(1));

    let w = words.clone();
    let stats = thread::spawn(move || {
        for _ in 0..10_000 {
            incr(w.ptr(0));
        }
        abi::thread_stats()
    })
    .join()
    .unwrap();

    assert_eq!(words.peek(0), 10_000);
    // an uncontended pipeline transaction is always the oldest, so it runs
    // and commits in turbo mode, which does not distinguish read-only
    assert_eq!(stats.commits_rw, 10_000);
    assert_eq!(stats.aborts, 0);
}

#[test]
fn two_thread_counter() {
    select_algorithm(ALG);
    let words = Arc::new(SharedWords::new(1));
    let per_thread = 20_000;

    let mut handles = vec![];
    for _ in 0..2 {
        let w = words.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..per_thread {
                incr(w.ptr(0));
            }
            abi::thread_stats()
        }));
    }
    let stats: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(words.peek(0), 2 * per_thread);
    assert_eq!(
        stats
            .iter()
            .map(|s| s.commits_ro + s.commits_rw)
            .sum::<u64>(),
        2 * per_thread as u64
    );
}

#[test]
fn bank_transfers_conserve_money() {
    select_algorithm(ALG);
    let accounts = Arc::new(SharedWords::with_value(8, 1_000));
    let threads = 4;
    let transfers = 2_000;

    let mut handles = vec![];
    for _ in 0..threads {
        let accounts = accounts.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for _ in 0..transfers {
                let from = rng.gen_range(0..accounts.len());
                let to = rng.gen_range(0..accounts.len());
                let amount = rng.gen_range(1..=50);
                atomically(|| {
                    let from_bal = tx_read(accounts.ptr(from))?;
                    let to_bal = tx_read(accounts.ptr(to))?;
                    if from != to && from_bal >= amount {
                        tx_write(accounts.ptr(from), from_bal - amount)?;
                        tx_write(accounts.ptr(to), to_bal + amount)?;
                    }
                    Ok(())
                });
            }
        }));
    }

    // concurrent auditor: every serialized snapshot must balance
    let auditor = {
        let accounts = accounts.clone();
        thread::spawn(move || {
            for _ in 0..500 {
                assert_eq!(sum(&accounts), 8 * 1_000, "money not conserved");
            }
        })
    };

    for h in handles {
        h.join().unwrap();
    }
    auditor.join().unwrap();

    assert_eq!(sum(&accounts), 8 * 1_000);
}

#[test]
fn writer_chain_stays_ordered() {
    select_algorithm(ALG);
    // each transaction appends the next value; a lost update or stale read
    // would leave a hole
    let words = Arc::new(SharedWords::new(1));

    let mut handles = vec![];
    for _ in 0..4 {
        let w = words.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..5_000 {
                atomically(|| {
                    let v = tx_read(w.ptr(0))?;
                    tx_write(w.ptr(0), v + 1)
                });
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(words.peek(0), 20_000);
}
