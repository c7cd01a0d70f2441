//! Conservation under concurrency: every pushed value is popped exactly once.
//!
//! Producers and consumers retry with `yield_now`, so these stay fast even
//! when there are more threads than cores.

use std::thread;

use nexus_ring::{mpmc, spmc, spsc};

const N: u64 = 1_000_000;
const EXPONENT: u32 = 10;

fn triangular(n: u64) -> u64 {
    n * (n - 1) / 2
}

#[test]
fn spsc_single_producer_sum() {
    let (mut tx, mut rx) = spsc::with_exponent::<u64>(EXPONENT).unwrap();

    let producer = thread::spawn(move || {
        for i in 0..N {
            let mut value = i;
            while let Err(full) = tx.push(value) {
                value = full.into_inner();
                thread::yield_now();
            }
        }
    });

    let consumer = thread::spawn(move || {
        let mut sum = 0u64;
        for _ in 0..N {
            loop {
                if let Some(v) = rx.pop() {
                    sum += v;
                    break;
                }
                thread::yield_now();
            }
        }
        sum
    });

    producer.join().unwrap();
    assert_eq!(consumer.join().unwrap(), triangular(N));
}

#[test]
fn mpmc_sixteen_by_sixteen_sum() {
    const THREADS: u64 = 16;

    let (tx, rx) = mpmc::with_exponent::<u64>(EXPONENT).unwrap();

    let producers: Vec<_> = (0..THREADS)
        .map(|_| {
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..N {
                    while tx.push(i).is_err() {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    drop(tx);

    // Each consumer takes exactly N values, so the split is fixed up front.
    let consumers: Vec<_> = (0..THREADS)
        .map(|_| {
            let rx = rx.clone();
            thread::spawn(move || {
                let mut sum = 0u64;
                for _ in 0..N {
                    loop {
                        if let Some(v) = rx.pop() {
                            sum += v;
                            break;
                        }
                        thread::yield_now();
                    }
                }
                sum
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    let total: u64 = consumers.into_iter().map(|c| c.join().unwrap()).sum();

    assert_eq!(total, THREADS * triangular(N));
    assert_eq!(rx.pop(), None);
}

#[test]
fn spmc_fan_out_sum() {
    const CONSUMERS: u64 = 32;
    const PER_CONSUMER: u64 = N / 4;
    let total_values = PER_CONSUMER * CONSUMERS;

    let (mut tx, rx) = spmc::with_exponent::<u64>(EXPONENT).unwrap();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let rx = rx.clone();
            thread::spawn(move || {
                let mut sum = 0u64;
                for _ in 0..PER_CONSUMER {
                    loop {
                        if let Some(v) = rx.pop() {
                            sum += v;
                            break;
                        }
                        thread::yield_now();
                    }
                }
                sum
            })
        })
        .collect();

    for i in 0..total_values {
        while tx.push(i).is_err() {
            thread::yield_now();
        }
    }

    let sums: Vec<u64> = consumers.into_iter().map(|c| c.join().unwrap()).collect();
    assert_eq!(sums.iter().sum::<u64>(), triangular(total_values));
    assert_eq!(rx.pop(), None);
}

#[test]
fn spmc_pop_spin_drains_until_producer_leaves() {
    const CONSUMERS: usize = 4;
    const COUNT: u64 = 200_000;

    let (mut tx, rx) = spmc::with_exponent::<u64>(6).unwrap();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let rx = rx.clone();
            thread::spawn(move || {
                let mut sum = 0u64;
                let mut count = 0u64;
                while let Some(v) = rx.pop_spin() {
                    sum += v;
                    count += 1;
                }
                (sum, count)
            })
        })
        .collect();
    drop(rx);

    for i in 0..COUNT {
        while tx.push(i).is_err() {
            thread::yield_now();
        }
    }
    drop(tx);

    let (sum, count) = consumers
        .into_iter()
        .map(|c| c.join().unwrap())
        .fold((0, 0), |(s, c), (s2, c2)| (s + s2, c + c2));

    assert_eq!(count, COUNT);
    assert_eq!(sum, triangular(COUNT));
}

#[test]
fn mpmc_fifo_per_producer() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 100_000;

    let (tx, rx) = mpmc::with_exponent::<(u64, u64)>(6).unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    while tx.push((p, i)).is_err() {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    drop(tx);

    // A single consumer must see each producer's values in push order.
    let mut next = [0u64; PRODUCERS as usize];
    let mut received = 0;
    while received < PRODUCERS * PER_PRODUCER {
        match rx.pop() {
            Some((p, i)) => {
                assert_eq!(next[p as usize], i, "producer {p} reordered");
                next[p as usize] += 1;
                received += 1;
            }
            None => thread::yield_now(),
        }
    }

    for p in producers {
        p.join().unwrap();
    }
    assert!(rx.is_disconnected());
    assert_eq!(rx.pop(), None);
}
