//! Compares the three queues on two workload families, computing a small prime sieve between two
//! operations as CPU filler:
//!
//! * random: each operation is an enqueue or a dequeue depending on a pre-generated random
//!   sequence, the same sequence for every queue;
//! * series: each worker repeatedly performs `enqueue_cnt` enqueues followed by `dequeue_cnt`
//!   dequeues.
//!
//! Enqueued minus dequeued values, minus what is left in the queue at the end, must sum to zero.
//!
//! Run with: `RUST_LOG=info cargo run --release --example bench_queues`

extern crate core_affinity;
extern crate env_logger;
#[macro_use]
extern crate log;
extern crate rand;
extern crate rs_hpqueue;

use rand::Rng;

use rs_hpqueue::baseline_queue::BaselineQueue;
use rs_hpqueue::lockfree_queue::LockFreeQueue;
use rs_hpqueue::queue::Queue;
use rs_hpqueue::two_lock_queue::TwoLockQueue;
use rs_hpqueue::util;
use std::thread;

const ITERATIONS: usize = 1_000_000;
const SIEVE_BOUND: usize = 100;
const BIAS: usize = 2;

fn set_cpu_affinity(idx: usize) {
    if let Some(cpus) = core_affinity::get_core_ids() {
        if !cpus.is_empty() {
            core_affinity::set_for_current(cpus[idx % cpus.len()]);
        }
    }
}

/// Number of primes up to `upper_bound`.
fn sieve(upper_bound: usize) -> usize {
    let mut is_composite = vec![false; upper_bound + 1];
    let mut m = 2;
    while m * m <= upper_bound {
        if !is_composite[m] {
            let mut k = m * m;
            while k <= upper_bound {
                is_composite[k] = true;
                k += m;
            }
        }
        m += 1;
    }
    (2..=upper_bound).filter(|&m| !is_composite[m]).count()
}

fn filler() {
    if SIEVE_BOUND > 0 {
        assert!(sieve(SIEVE_BOUND) > 0);
    }
}

/// Enqueue `seed` values, return their sum.
fn seed_queue<Q: Queue<i64>>(q: &mut Q, seed: usize) -> i64 {
    let mut sum = 0;
    for i in 0..seed {
        let x = (i % 37) as i64;
        q.enqueue(x);
        sum += x;
    }
    sum
}

/// Dequeue until empty, return the sum of the values.
fn empty_queue<Q: Queue<i64>>(q: &mut Q) -> i64 {
    let mut sum = 0;
    while let Some(x) = q.dequeue() {
        sum += x;
    }
    sum
}

/// Enqueue on even randoms, dequeue on odd ones. Return the sum of the values enqueued minus the
/// sum of the values dequeued.
fn random_worker<Q: Queue<i64>>(q: &mut Q, randoms: &[u32]) -> i64 {
    let mut sum = 0;
    for &r in randoms {
        filler();
        if r % 2 == 0 {
            let x = (r % 37) as i64;
            q.enqueue(x);
            sum += x;
        } else if let Some(x) = q.dequeue() {
            sum -= x;
        }
    }
    sum
}

/// Return the sum of the values enqueued minus the sum of the values dequeued.
fn series_worker<Q: Queue<i64>>(
    q: &mut Q,
    iterations: usize,
    enqueue_cnt: usize,
    dequeue_cnt: usize,
) -> i64 {
    let mut sum = 0;
    for i in 0..iterations {
        for _ in 0..enqueue_cnt {
            filler();
            let x = (i % 37) as i64;
            q.enqueue(x);
            sum += x;
        }
        for _ in 0..dequeue_cnt {
            filler();
            if let Some(x) = q.dequeue() {
                sum -= x;
            }
        }
    }
    sum
}

fn seed_for(iterations: usize, enqueue_cnt: usize, dequeue_cnt: usize) -> usize {
    if dequeue_cnt > enqueue_cnt {
        iterations / (dequeue_cnt - enqueue_cnt)
    } else {
        0
    }
}

fn report(name: &str, sum: i64, begin: i64) {
    let cost = util::get_cur_microseconds_time() - begin;
    println!(
        "{}\t{}\t{} us",
        name,
        if sum == 0 { "PASS" } else { "FAIL" },
        cost
    );
}

fn random_sequential<Q: Queue<i64>>(name: &str, q: &mut Q, randoms: &[u32]) {
    let begin = util::get_cur_microseconds_time();
    let mut sum = random_worker(q, randoms);
    sum -= empty_queue(q);
    report(name, sum, begin);
}

fn random_concurrent_two_lock(randoms: &[u32], thread_cnt: usize) {
    let queue = TwoLockQueue::new();
    let n = randoms.len() / thread_cnt;
    let begin = util::get_cur_microseconds_time();
    let mut sum = thread::scope(|s| {
        let handles: Vec<_> = randoms
            .chunks(n.max(1))
            .take(thread_cnt)
            .enumerate()
            .map(|(idx, part)| {
                let queue = &queue;
                s.spawn(move || {
                    set_cpu_affinity(idx);
                    random_worker(&mut &*queue, part)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum::<i64>()
    });
    sum -= empty_queue(&mut &queue);
    report("Concurrent Locking ", sum, begin);
}

fn random_concurrent_lockfree(randoms: &[u32], thread_cnt: usize) {
    let queue = LockFreeQueue::new();
    let n = randoms.len() / thread_cnt;
    let accessors: Vec<_> = (0..thread_cnt).map(|_| queue.create_accessor()).collect();
    let begin = util::get_cur_microseconds_time();
    let mut sum = thread::scope(|s| {
        let handles: Vec<_> = randoms
            .chunks(n.max(1))
            .zip(accessors)
            .enumerate()
            .map(|(idx, (part, mut accessor))| {
                s.spawn(move || {
                    set_cpu_affinity(idx);
                    random_worker(&mut accessor, part)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum::<i64>()
    });
    sum -= empty_queue(&mut queue.create_accessor());
    report("Concurrent Lockless", sum, begin);
}

fn random_tests(iterations: usize, thread_cnt: usize) {
    println!("\nRandom Tests");
    let mut rng = rand::thread_rng();
    let randoms: Vec<u32> = (0..iterations).map(|_| rng.gen()).collect();

    random_sequential("Sequential Simple  ", &mut BaselineQueue::new(), &randoms);
    let two_lock = TwoLockQueue::new();
    random_sequential("Sequential Locking ", &mut &two_lock, &randoms);
    let lockfree = LockFreeQueue::new();
    random_sequential(
        "Sequential Lockless",
        &mut lockfree.create_accessor(),
        &randoms,
    );
    random_concurrent_two_lock(&randoms, thread_cnt);
    random_concurrent_lockfree(&randoms, thread_cnt);
}

fn series_sequential<Q: Queue<i64>>(
    name: &str,
    q: &mut Q,
    iterations: usize,
    enqueue_cnt: usize,
    dequeue_cnt: usize,
) {
    let mut sum = seed_queue(q, seed_for(iterations, enqueue_cnt, dequeue_cnt));
    let begin = util::get_cur_microseconds_time();
    sum += series_worker(q, iterations, enqueue_cnt, dequeue_cnt);
    sum -= empty_queue(q);
    report(name, sum, begin);
}

fn series_concurrent_two_lock(
    iterations: usize,
    enqueue_cnt: usize,
    dequeue_cnt: usize,
    thread_cnt: usize,
) {
    let queue = TwoLockQueue::new();
    let mut sum = seed_queue(&mut &queue, seed_for(iterations, enqueue_cnt, dequeue_cnt));
    let n = iterations / thread_cnt;
    let begin = util::get_cur_microseconds_time();
    sum += thread::scope(|s| {
        let handles: Vec<_> = (0..thread_cnt)
            .map(|idx| {
                let queue = &queue;
                s.spawn(move || {
                    set_cpu_affinity(idx);
                    series_worker(&mut &*queue, n, enqueue_cnt, dequeue_cnt)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum::<i64>()
    });
    sum -= empty_queue(&mut &queue);
    report("Concurrent Locking ", sum, begin);
}

fn series_concurrent_lockfree(
    iterations: usize,
    enqueue_cnt: usize,
    dequeue_cnt: usize,
    thread_cnt: usize,
) {
    let queue = LockFreeQueue::new();
    let mut main_accessor = queue.create_accessor();
    let mut sum = seed_queue(
        &mut main_accessor,
        seed_for(iterations, enqueue_cnt, dequeue_cnt),
    );
    let n = iterations / thread_cnt;
    let accessors: Vec<_> = (0..thread_cnt).map(|_| queue.create_accessor()).collect();
    let begin = util::get_cur_microseconds_time();
    sum += thread::scope(|s| {
        let handles: Vec<_> = accessors
            .into_iter()
            .enumerate()
            .map(|(idx, mut accessor)| {
                s.spawn(move || {
                    set_cpu_affinity(idx);
                    series_worker(&mut accessor, n, enqueue_cnt, dequeue_cnt)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum::<i64>()
    });
    sum -= empty_queue(&mut main_accessor);
    report("Concurrent Lockless", sum, begin);
    info!(
        "hazard records {}, scan threshold {}",
        queue.record_count(),
        queue.scan_threshold()
    );
}

fn series_tests(iterations: usize, thread_cnt: usize, bias: usize) {
    let iterations = iterations / (bias + 1);
    for &(title, enqueue_cnt, dequeue_cnt) in &[
        ("Enqueue Bias Series Tests", bias, 1),
        ("Dequeue Bias Series Tests", 1, bias),
    ] {
        println!("\n{}", title);
        series_sequential(
            "Sequential Simple  ",
            &mut BaselineQueue::new(),
            iterations,
            enqueue_cnt,
            dequeue_cnt,
        );
        let two_lock = TwoLockQueue::new();
        series_sequential(
            "Sequential Locking ",
            &mut &two_lock,
            iterations,
            enqueue_cnt,
            dequeue_cnt,
        );
        let lockfree = LockFreeQueue::new();
        series_sequential(
            "Sequential Lockless",
            &mut lockfree.create_accessor(),
            iterations,
            enqueue_cnt,
            dequeue_cnt,
        );
        series_concurrent_two_lock(iterations, enqueue_cnt, dequeue_cnt, thread_cnt);
        series_concurrent_lockfree(iterations, enqueue_cnt, dequeue_cnt, thread_cnt);
    }
}

fn main() {
    env_logger::init();

    let thread_cnt = core_affinity::get_core_ids().map_or(8, |cpus| cpus.len().max(1));
    println!("Iterations {}", ITERATIONS);
    println!("Sieve Bound {}", SIEVE_BOUND);
    println!("Threads {}", thread_cnt);
    println!("Series Bias {}", BIAS);

    let start = util::get_cur_microseconds_time();
    random_tests(ITERATIONS, thread_cnt);
    series_tests(ITERATIONS, thread_cnt, BIAS);
    info!(
        "time cost {} ms",
        (util::get_cur_microseconds_time() - start) / 1000
    );
}
