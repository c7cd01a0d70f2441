//! Stress driver for the nexus-ring queues.
//!
//! Spawns producer and consumer threads over one ring, pushes sequential
//! integers, and checks that the consumers' sums add up to exactly what was
//! pushed.
//!
//! Run with:
//!   cargo run --release --bin ring_stress -- --variant=mpmc --producers=16 --consumers=16
//!
//! With `--features tracing` and `--trace`, every push and pop is logged at
//! trace level (set `RUST_LOG=nexus_ring=trace`).
//!
//! # Exit Codes
//!
//! - `0`: sums matched
//! - `1`: sums did not match
//! - `2`: invalid arguments or ring construction failure

use std::env;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nexus_ring::observe::{Counters, Event, Observer};
use nexus_ring::{mpmc, spmc, spsc, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Spsc,
    Spmc,
    Mpmc,
}

#[derive(Debug)]
struct Config {
    variant: Variant,
    producers: usize,
    consumers: usize,
    per_producer: u64,
    exponent: u32,
    trace: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            variant: Variant::Mpmc,
            producers: 4,
            consumers: 4,
            per_producer: 1_000_000,
            exponent: 10,
            trace: false,
        }
    }
}

fn print_usage(exe: &str) {
    eprintln!(
        "usage: {exe} [OPTIONS]

OPTIONS:
    --variant=<spsc|spmc|mpmc>  Ring variant (default: mpmc)
    --producers=<N>             Producer threads (default: 4; spsc/spmc require 1)
    --consumers=<N>             Consumer threads (default: 4; spsc requires 1)
    --per-producer=<N>          Values pushed by each producer (default: 1000000)
    --exponent=<N>              Ring holds 2^N slots (default: 10)
    --trace                     Log every push/pop (needs the `tracing` feature)
    --help, -h                  Show this help message"
    );
}

fn fail(exe: &str, message: &str) -> ! {
    eprintln!("{message}");
    print_usage(exe);
    process::exit(2);
}

fn parse_number<N: std::str::FromStr>(exe: &str, flag: &str, value: &str) -> N {
    value
        .parse()
        .unwrap_or_else(|_| fail(exe, &format!("invalid {flag} value: {value}")))
}

fn parse_args() -> Config {
    let mut args = env::args();
    let exe = args.next().unwrap_or_else(|| "ring_stress".into());
    let mut config = Config::default();
    let mut producers = None;
    let mut consumers = None;

    for arg in args {
        if let Some(value) = arg.strip_prefix("--variant=") {
            config.variant = match value {
                "spsc" => Variant::Spsc,
                "spmc" => Variant::Spmc,
                "mpmc" => Variant::Mpmc,
                other => fail(&exe, &format!("unknown variant: {other}")),
            };
        } else if let Some(value) = arg.strip_prefix("--producers=") {
            producers = Some(parse_number(&exe, "--producers", value));
        } else if let Some(value) = arg.strip_prefix("--consumers=") {
            consumers = Some(parse_number(&exe, "--consumers", value));
        } else if let Some(value) = arg.strip_prefix("--per-producer=") {
            config.per_producer = parse_number(&exe, "--per-producer", value);
        } else if let Some(value) = arg.strip_prefix("--exponent=") {
            config.exponent = parse_number(&exe, "--exponent", value);
        } else if arg == "--trace" {
            config.trace = true;
        } else if arg == "--help" || arg == "-h" {
            print_usage(&exe);
            process::exit(0);
        } else {
            fail(&exe, &format!("unknown argument: {arg}"));
        }
    }

    // Single-sided variants default to one thread on that side.
    let (default_producers, default_consumers) = match config.variant {
        Variant::Spsc => (1, 1),
        Variant::Spmc => (1, config.consumers),
        Variant::Mpmc => (config.producers, config.consumers),
    };
    config.producers = producers.unwrap_or(default_producers);
    config.consumers = consumers.unwrap_or(default_consumers);

    if config.producers == 0 || config.consumers == 0 {
        fail(&exe, "thread counts must be non-zero");
    }
    if config.variant != Variant::Mpmc && config.producers != 1 {
        fail(&exe, "spsc and spmc rings take exactly one producer");
    }
    if config.variant == Variant::Spsc && config.consumers != 1 {
        fail(&exe, "spsc rings take exactly one consumer");
    }
    if config.trace && !cfg!(feature = "tracing") {
        fail(&exe, "--trace requires building with --features tracing");
    }

    config
}

/// Observer for the driver: always counts, optionally logs.
struct StressObserver {
    counters: Arc<Counters>,
    #[cfg(feature = "tracing")]
    tracer: Option<nexus_ring::observe::TracingObserver>,
}

impl Observer for StressObserver {
    #[inline]
    fn on_push(&self, event: Event) {
        self.counters.on_push(event);
        #[cfg(feature = "tracing")]
        if let Some(tracer) = &self.tracer {
            tracer.on_push(event);
        }
    }

    #[inline]
    fn on_pop(&self, event: Event) {
        self.counters.on_pop(event);
        #[cfg(feature = "tracing")]
        if let Some(tracer) = &self.tracer {
            tracer.on_pop(event);
        }
    }
}

/// How many values consumer `index` takes so the split covers `total`.
fn share(total: u64, consumers: usize, index: usize) -> u64 {
    let consumers = consumers as u64;
    let index = index as u64;
    total / consumers + u64::from(index < total % consumers)
}

fn spin_pop<T>(mut pop: impl FnMut() -> Option<T>) -> T {
    loop {
        if let Some(value) = pop() {
            return value;
        }
        thread::yield_now();
    }
}

fn run_spsc(config: &Config, observer: StressObserver) -> Result<u64, nexus_ring::CapacityError> {
    let (mut tx, mut rx) = spsc::with_observer::<u64, _>(config.exponent, observer)?;
    let count = config.per_producer;

    let producer = thread::spawn(move || {
        for i in 0..count {
            while tx.push(i).is_err() {
                thread::yield_now();
            }
        }
    });

    let consumer = thread::spawn(move || (0..count).map(|_| spin_pop(|| rx.pop())).sum::<u64>());

    producer.join().expect("producer panicked");
    Ok(consumer.join().expect("consumer panicked"))
}

fn run_spmc(config: &Config, observer: StressObserver) -> Result<u64, nexus_ring::CapacityError> {
    let (mut tx, rx) = spmc::with_observer::<u64, _>(config.exponent, observer)?;
    let total = config.per_producer;

    let consumers: Vec<_> = (0..config.consumers)
        .map(|index| {
            let rx = rx.clone();
            let take = share(total, config.consumers, index);
            thread::spawn(move || (0..take).map(|_| spin_pop(|| rx.pop())).sum::<u64>())
        })
        .collect();
    drop(rx);

    for i in 0..total {
        while tx.push(i).is_err() {
            thread::yield_now();
        }
    }

    Ok(consumers
        .into_iter()
        .map(|c| c.join().expect("consumer panicked"))
        .sum())
}

fn run_mpmc(config: &Config, observer: StressObserver) -> Result<u64, nexus_ring::CapacityError> {
    let (tx, rx) = mpmc::with_observer::<u64, _>(config.exponent, observer)?;
    let total = config.per_producer * config.producers as u64;

    let producers: Vec<_> = (0..config.producers)
        .map(|_| {
            let tx = tx.clone();
            let count = config.per_producer;
            thread::spawn(move || {
                for i in 0..count {
                    while tx.push(i).is_err() {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    drop(tx);

    let consumers: Vec<_> = (0..config.consumers)
        .map(|index| {
            let rx = rx.clone();
            let take = share(total, config.consumers, index);
            thread::spawn(move || (0..take).map(|_| spin_pop(|| rx.pop())).sum::<u64>())
        })
        .collect();

    for p in producers {
        p.join().expect("producer panicked");
    }
    Ok(consumers
        .into_iter()
        .map(|c| c.join().expect("consumer panicked"))
        .sum())
}

fn main() {
    let config = parse_args();
    trace::init_tracing();

    let counters = Arc::new(Counters::new());
    let observer = StressObserver {
        counters: Arc::clone(&counters),
        #[cfg(feature = "tracing")]
        tracer: config
            .trace
            .then(|| nexus_ring::observe::TracingObserver::new("stress")),
    };

    let start = Instant::now();
    let result = match config.variant {
        Variant::Spsc => run_spsc(&config, observer),
        Variant::Spmc => run_spmc(&config, observer),
        Variant::Mpmc => run_mpmc(&config, observer),
    };
    let elapsed = start.elapsed();

    let sum = result.unwrap_or_else(|e| {
        eprintln!("failed to build ring: {e}");
        process::exit(2);
    });

    let n = config.per_producer;
    let expected = (n * n.saturating_sub(1) / 2) * config.producers as u64;
    let values = counters.popped();

    println!(
        "variant={:?} producers={} consumers={} capacity={} values={} sum={} expected={} \
         high_water={} elapsed_ms={} throughput_mops={:.2}",
        config.variant,
        config.producers,
        config.consumers,
        1u64 << config.exponent,
        values,
        sum,
        expected,
        counters.high_water(),
        elapsed.as_millis(),
        mops(values, elapsed),
    );

    if sum != expected || values != n * config.producers as u64 {
        eprintln!("conservation violated: got sum {sum} over {values} values");
        process::exit(1);
    }
}

fn mops(values: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    values as f64 / secs / 1e6
}
