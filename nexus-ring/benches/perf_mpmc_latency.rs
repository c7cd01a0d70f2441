//! Ping-pong latency for nexus-ring MPMC and SPSC rings.
//!
//! Two rings carry a value to a worker thread and back; half the round trip
//! is recorded as the one-way latency.
//!
//! Run: cargo build --release --bench perf_mpmc_latency
//! Profile: sudo taskset -c 0,2 ./target/release/deps/perf_mpmc_latency-*

use std::thread;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use nexus_ring::{mpmc, spsc};

const WARMUP: usize = 100_000;
const SAMPLES: usize = 1_000_000;
const EXPONENT: u32 = 6;

#[cfg(target_arch = "x86_64")]
#[inline]
fn rdtscp() -> u64 {
    unsafe {
        let mut aux: u32 = 0;
        core::arch::x86_64::__rdtscp(&mut aux)
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
fn rdtscp() -> u64 {
    use std::sync::OnceLock;
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Runs the ping-pong loop given send/recv closures for each direction.
fn ping_pong(
    mut send: impl FnMut(u64) -> bool,
    mut recv: impl FnMut() -> Option<u64>,
    echo: thread::JoinHandle<()>,
) -> Histogram<u64> {
    let mut round_trip = |value: u64| {
        while !send(value) {
            std::hint::spin_loop();
        }
        loop {
            if let Some(v) = recv() {
                break v;
            }
            std::hint::spin_loop();
        }
    };

    for i in 0..WARMUP as u64 {
        round_trip(i);
    }

    let mut hist = Histogram::<u64>::new_with_max(1_000_000, 3).unwrap();
    for i in 0..SAMPLES as u64 {
        let start = rdtscp();
        let echoed = round_trip(i);
        let end = rdtscp();
        assert_eq!(echoed, i);
        let _ = hist.record((end.wrapping_sub(start) / 2).min(1_000_000));
    }

    echo.join().unwrap();
    hist
}

fn mpmc_latency() -> Histogram<u64> {
    let (fwd_tx, fwd_rx) = mpmc::with_exponent::<u64>(EXPONENT).unwrap();
    let (ret_tx, ret_rx) = mpmc::with_exponent::<u64>(EXPONENT).unwrap();

    let echo = thread::spawn(move || {
        for _ in 0..WARMUP + SAMPLES {
            let v = loop {
                if let Some(v) = fwd_rx.pop() {
                    break v;
                }
                std::hint::spin_loop();
            };
            while ret_tx.push(v).is_err() {
                std::hint::spin_loop();
            }
        }
    });

    ping_pong(|v| fwd_tx.push(v).is_ok(), || ret_rx.pop(), echo)
}

fn spsc_latency() -> Histogram<u64> {
    let (mut fwd_tx, mut fwd_rx) = spsc::with_exponent::<u64>(EXPONENT).unwrap();
    let (mut ret_tx, mut ret_rx) = spsc::with_exponent::<u64>(EXPONENT).unwrap();

    let echo = thread::spawn(move || {
        for _ in 0..WARMUP + SAMPLES {
            let v = loop {
                if let Some(v) = fwd_rx.pop() {
                    break v;
                }
                std::hint::spin_loop();
            };
            while ret_tx.push(v).is_err() {
                std::hint::spin_loop();
            }
        }
    });

    ping_pong(|v| fwd_tx.push(v).is_ok(), || ret_rx.pop(), echo)
}

fn estimate_cpu_freq_ghz() -> f64 {
    let start_cycles = rdtscp();
    let start_time = Instant::now();

    thread::sleep(Duration::from_millis(10));

    let end_cycles = rdtscp();
    let elapsed = start_time.elapsed();

    end_cycles.wrapping_sub(start_cycles) as f64 / elapsed.as_nanos() as f64
}

fn report(name: &str, hist: &Histogram<u64>, cpu_ghz: f64) {
    println!("{name} one-way latency (cycles / ns):");
    for (label, q) in [("p50", 0.50), ("p90", 0.90), ("p99", 0.99), ("p999", 0.999)] {
        let cycles = hist.value_at_quantile(q);
        println!("  {label:<5} {cycles:>7}  {:>8.1} ns", cycles as f64 / cpu_ghz);
    }
    println!("  min   {:>7}", hist.min());
    println!("  max   {:>7}", hist.max());
    println!("  mean  {:>7.0}", hist.mean());
    println!();
}

fn main() {
    println!("nexus-ring ping-pong latency");
    println!("Warmup:   {WARMUP:>8}");
    println!("Samples:  {SAMPLES:>8}");
    println!("Capacity: {:>8}", 1usize << EXPONENT);
    println!();

    let cpu_ghz = estimate_cpu_freq_ghz();
    println!("Estimated CPU freq: {cpu_ghz:.2} GHz");
    println!();

    report("mpmc", &mpmc_latency(), cpu_ghz);
    report("spsc", &spsc_latency(), cpu_ghz);
}
