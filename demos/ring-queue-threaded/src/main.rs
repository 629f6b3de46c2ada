use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Result, anyhow, bail, ensure};
use argh::FromArgs;
use bytesize::ByteSize;
use ring_queue::{EmptyQueue, RingQueue};

/// (producer, sequence number)
type Item = (usize, usize);

#[derive(Debug, FromArgs)]
/// Stress a shared ring queue with concurrent producers and consumers
#[argh(help_triggers("--help"))]
struct Args {
    /// number of producer threads
    #[argh(option, default = "4")]
    producers: usize,
    /// number of consumer threads
    #[argh(option, default = "4")]
    consumers: usize,
    /// items enqueued by each producer
    #[argh(option, default = "100_000")]
    items: usize,
    /// seed of the random pacing, picked randomly if omitted
    #[argh(option)]
    seed: Option<u64>,
}

struct Config {
    producers: NonZeroUsize,
    consumers: NonZeroUsize,
    items: NonZeroUsize,
    seed: u64,
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self> {
        let non_zero = |val: usize, name: &str| {
            NonZeroUsize::new(val).ok_or_else(|| anyhow!("{name} must not be zero"))
        };
        Ok(Self {
            producers: non_zero(args.producers, "producers")?,
            consumers: non_zero(args.consumers, "consumers")?,
            items: non_zero(args.items, "items")?,
            seed: args.seed.unwrap_or_else(|| fastrand::u64(..)),
        })
    }
}

pub fn main() -> Result<()> {
    let args = argh::from_env::<Args>();
    tracing_subscriber::fmt()
        .with_thread_names(true)
        .without_time()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::try_from(args)?;
    tracing::info!(
        "started stress run, producers={} consumers={} items={} seed={}",
        config.producers,
        config.consumers,
        config.items,
        config.seed,
    );

    let queue = RingQueue::<Item>::new();
    let finished = AtomicUsize::new(0);
    let peak_capacity = AtomicUsize::new(queue.capacity());

    let now = Instant::now();
    let outputs = std::thread::scope(|cx| -> Result<Vec<Vec<Item>>> {
        for p in 0..config.producers.get() {
            let (queue, finished, peak_capacity) = (&queue, &finished, &peak_capacity);
            let mut rng = fastrand::Rng::with_seed(config.seed.wrapping_add(p as u64));
            std::thread::Builder::new()
                .name(format!("producer-{p}"))
                .spawn_scoped(cx, move || {
                    for seq in 0..config.items.get() {
                        queue.enqueue((p, seq));
                        if rng.u8(..) < 8 {
                            peak_capacity.fetch_max(queue.capacity(), Ordering::Relaxed);
                            std::thread::yield_now();
                        }
                    }
                    peak_capacity.fetch_max(queue.capacity(), Ordering::Relaxed);
                    finished.fetch_add(1, Ordering::Release);
                    tracing::debug!("finished producer({p})");
                })?;
        }

        let consumers = (0..config.consumers.get())
            .map(|c| {
                let (queue, finished) = (&queue, &finished);
                let producers = config.producers.get();
                std::thread::Builder::new()
                    .name(format!("consumer-{c}"))
                    .spawn_scoped(cx, move || {
                        let mut r = vec![];
                        let mut polls = 0usize;
                        loop {
                            // Read the counter first, an empty queue afterwards
                            // means all items were taken.
                            let done = finished.load(Ordering::Acquire) == producers;
                            match queue.dequeue() {
                                Ok(item) => r.push(item),
                                Err(EmptyQueue) if done => break,
                                Err(EmptyQueue) => {
                                    polls += 1;
                                    std::thread::yield_now();
                                },
                            }
                        }
                        tracing::debug!(
                            "finished consumer({c}), received={} empty_polls={polls}",
                            r.len()
                        );
                        r
                    })
                    .map_err(anyhow::Error::from)
            })
            .collect::<Result<Vec<_>>>()?;

        consumers
            .into_iter()
            .map(|c| c.join().map_err(|_| anyhow!("consumer panicked")))
            .collect::<Result<Vec<_>>>()
    })?;
    let elapsed = now.elapsed();

    verify(&config, &outputs)?;
    ensure!(queue.is_empty(), "queue not drained, len={}", queue.len());

    let total = config.producers.get() * config.items.get();
    let peak = peak_capacity.load(Ordering::Relaxed);
    let footprint = ByteSize::b((peak * size_of::<Option<Item>>()) as u64);
    tracing::info!(
        "verified {total} items in {}ms, peak_capacity={peak} peak_storage={} final_capacity={}",
        elapsed.as_millis(),
        footprint.display().iec_short(),
        queue.capacity(),
    );

    Ok(())
}

/// Checks that every item was received exactly once and that each consumer
/// saw every producer's items in production order.
fn verify(config: &Config, outputs: &[Vec<Item>]) -> Result<()> {
    let producers = config.producers.get();
    let items = config.items.get();

    for (c, r) in outputs.iter().enumerate() {
        let mut last = vec![None::<usize>; producers];
        for &(p, seq) in r {
            ensure!(p < producers, "consumer({c}) received unknown producer({p})");
            if last[p].is_some_and(|prev| prev >= seq) {
                bail!("consumer({c}) received producer({p}) out of order at seq={seq}");
            }
            last[p] = Some(seq);
        }
    }

    let mut seen = vec![0u32; producers * items];
    for &(p, seq) in outputs.iter().flatten() {
        ensure!(seq < items, "producer({p}) sent unknown seq={seq}");
        seen[p * items + seq] += 1;
    }
    if let Some(i) = seen.iter().position(|&n| n != 1) {
        bail!(
            "producer({}) seq={} received {} times",
            i / items,
            i % items,
            seen[i]
        );
    }

    Ok(())
}
