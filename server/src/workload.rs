//! Built-in demo workload
//!
//! Two background threads give the profiler something to look at: a CPU
//! loop (sorting, Fibonacci, matrix products, string hashing) that records
//! its own stack on the CPU recorder at a fixed interval, and an allocation
//! loop that records every buffer it allocates on the Heap recorder.

use flareprof_agent::{Profiler, RecordOutcome, SampleRecorder};
use flareprof_shared::types::events::ProfilerKind;
use std::collections::VecDeque;
use std::hint::black_box;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Live heap buffers kept by the allocation loop
const RETAINED_BUFFERS: usize = 64;

/// Spawn the CPU and heap workload threads.
pub fn spawn(
    profiler: &Profiler,
    interval: Duration,
    shutdown: CancellationToken,
) -> std::io::Result<Vec<JoinHandle<()>>> {
    info!(interval_ms = interval.as_millis() as u64, "Starting demo workload");

    let cpu = {
        let sampler = Sampler::new(profiler.recorder(ProfilerKind::Cpu), interval);
        let shutdown = shutdown.clone();
        std::thread::Builder::new()
            .name("demo-cpu".to_string())
            .spawn(move || cpu_loop(sampler, shutdown))?
    };

    let heap = {
        let recorder = profiler.recorder(ProfilerKind::Heap);
        std::thread::Builder::new()
            .name("demo-heap".to_string())
            .spawn(move || heap_loop(recorder, interval, shutdown))?
    };

    Ok(vec![cpu, heap])
}

/// Emulates a profiling timer: records the current stack once per interval.
struct Sampler {
    recorder: SampleRecorder,
    interval: Duration,
    last: Instant,
    recorded: u64,
}

impl Sampler {
    fn new(recorder: SampleRecorder, interval: Duration) -> Self {
        Self {
            recorder,
            interval,
            last: Instant::now(),
            recorded: 0,
        }
    }

    #[inline(never)]
    fn tick(&mut self) {
        if self.last.elapsed() < self.interval {
            return;
        }
        self.last = Instant::now();
        // Skip `tick` itself so samples end in the workload function.
        if self.recorder.record_current_stack(1, 1) == RecordOutcome::Recorded {
            self.recorded += 1;
        }
    }
}

fn cpu_loop(mut sampler: Sampler, shutdown: CancellationToken) {
    let mut rng = XorShift::new(0x2545_f491_4f6c_dd1d);
    while !shutdown.is_cancelled() {
        cpu_intensive_task(&mut sampler, &mut rng);
    }
    debug!(samples = sampler.recorded, "Demo CPU workload stopped");
}

#[inline(never)]
fn cpu_intensive_task(sampler: &mut Sampler, rng: &mut XorShift) {
    let mut data: Vec<u64> = (0..2000).map(|_| rng.next()).collect();
    process_data(sampler, &mut data);

    black_box(fibonacci_recursive(sampler, 22));
    black_box(fibonacci_iterative(sampler, 80));

    let a = create_matrix(rng, 24);
    let b = create_matrix(rng, 24);
    black_box(multiply_matrices(sampler, &a, &b));

    let words = ["hello", "world", "flame", "graph", "profile"];
    black_box(batch_hash(sampler, &words));
}

#[inline(never)]
fn process_data(sampler: &mut Sampler, data: &mut [u64]) {
    sort_data(sampler, data);
    data.reverse();
    sort_data(sampler, data);
}

#[inline(never)]
fn sort_data(sampler: &mut Sampler, data: &mut [u64]) {
    data.sort_unstable();
    sampler.tick();
}

#[inline(never)]
fn fibonacci_recursive(sampler: &mut Sampler, n: u32) -> u64 {
    if n <= 1 {
        sampler.tick();
        return n as u64;
    }
    fibonacci_recursive(sampler, n - 1) + fibonacci_recursive(sampler, n - 2)
}

#[inline(never)]
fn fibonacci_iterative(sampler: &mut Sampler, n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.wrapping_add(b);
        a = b;
        b = next;
    }
    sampler.tick();
    a
}

fn create_matrix(rng: &mut XorShift, size: usize) -> Vec<Vec<u64>> {
    (0..size)
        .map(|_| (0..size).map(|_| rng.next() % 1000).collect())
        .collect()
}

#[inline(never)]
fn multiply_matrices(sampler: &mut Sampler, a: &[Vec<u64>], b: &[Vec<u64>]) -> Vec<Vec<u64>> {
    let n = a.len();
    let mut result = vec![vec![0u64; n]; n];
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                result[i][j] = result[i][j].wrapping_add(a[i][k].wrapping_mul(b[k][j]));
            }
        }
        sampler.tick();
    }
    result
}

#[inline(never)]
fn batch_hash(sampler: &mut Sampler, words: &[&str]) -> Vec<u64> {
    let hashes = words
        .iter()
        .map(|word| {
            word.bytes()
                .fold(0u64, |hash, b| hash.wrapping_mul(31).wrapping_add(b as u64))
        })
        .collect();
    sampler.tick();
    hashes
}

fn heap_loop(recorder: SampleRecorder, interval: Duration, shutdown: CancellationToken) {
    let mut rng = XorShift::new(0x9e37_79b9_7f4a_7c15);
    let mut retained: VecDeque<Vec<u8>> = VecDeque::with_capacity(RETAINED_BUFFERS);
    let mut allocated: u64 = 0;

    while !shutdown.is_cancelled() {
        let buffer = match rng.next() % 3 {
            0 => allocate_small(&recorder, &mut rng),
            1 => allocate_medium(&recorder, &mut rng),
            _ => allocate_large(&recorder, &mut rng),
        };
        allocated += buffer.len() as u64;

        if retained.len() == RETAINED_BUFFERS {
            retained.pop_front();
        }
        retained.push_back(buffer);
        std::thread::sleep(interval);
    }
    debug!(bytes = allocated, "Demo heap workload stopped");
}

#[inline(never)]
fn allocate_small(recorder: &SampleRecorder, rng: &mut XorShift) -> Vec<u8> {
    allocate(recorder, 64 + (rng.next() % 960) as usize)
}

#[inline(never)]
fn allocate_medium(recorder: &SampleRecorder, rng: &mut XorShift) -> Vec<u8> {
    allocate(recorder, 16 * 1024 + (rng.next() % (48 * 1024)) as usize)
}

#[inline(never)]
fn allocate_large(recorder: &SampleRecorder, rng: &mut XorShift) -> Vec<u8> {
    allocate(recorder, 512 * 1024 + (rng.next() % (512 * 1024)) as usize)
}

#[inline(never)]
fn allocate(recorder: &SampleRecorder, size: usize) -> Vec<u8> {
    let buffer = vec![0xa5u8; size];
    recorder.record_current_stack(size as u64, 1);
    buffer
}

/// Small deterministic generator, enough to vary the workload
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}
