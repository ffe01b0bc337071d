// These tests exercise real threads and real blocking, which loom cannot
// simulate; the loom models live in the library's own test modules.
#![cfg(not(loom))]

mod util;

use hypha::{RawRwLock, RwLock};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Barrier,
    },
    thread,
    time::{Duration, Instant},
};

#[test]
fn concurrent_readers_overlap() {
    const READERS: usize = 5;

    let lock = Arc::new(RwLock::new(0u32));
    let barrier = Arc::new(Barrier::new(READERS));

    let threads = (0..READERS)
        .map(|_| {
            let lock = lock.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let guard = lock.read();
                // every reader must be inside the lock at once to get past
                // this; if reads excluded each other, the test would hang.
                barrier.wait();
                assert_eq!(*guard, 0);
            })
        })
        .collect::<Vec<_>>();

    for thread in threads {
        thread.join().expect("reader thread mustn't panic");
    }
}

#[test]
fn writers_exclude_each_other() {
    const WRITERS: usize = 4;
    const OPS: usize = 25;

    let lock = Arc::new(RwLock::new(0usize));
    let in_critical = Arc::new(AtomicBool::new(false));

    let threads = (0..WRITERS)
        .map(|_| {
            let lock = lock.clone();
            let in_critical = in_critical.clone();
            thread::spawn(move || {
                for _ in 0..OPS {
                    let mut guard = lock.write();
                    assert!(
                        !in_critical.swap(true, Ordering::SeqCst),
                        "two writers were inside the critical section at once!"
                    );
                    // a non-atomic increment; lost updates would show up in
                    // the final count
                    let value = *guard;
                    thread::yield_now();
                    *guard = value + 1;
                    in_critical.store(false, Ordering::SeqCst);
                }
            })
        })
        .collect::<Vec<_>>();

    for thread in threads {
        thread.join().expect("writer thread mustn't panic");
    }

    assert_eq!(*lock.read(), WRITERS * OPS);
}

#[test]
fn readers_never_observe_partial_writes() {
    const OPS: usize = 50;

    // the writer keeps `pair.1 == pair.0 * 2`; a reader that got in mid-write
    // would see the pair out of sync.
    let lock = Arc::new(RwLock::new((0usize, 0usize)));
    let done = Arc::new(AtomicBool::new(false));

    let writer = thread::spawn({
        let lock = lock.clone();
        let done = done.clone();
        move || {
            for i in 1..=OPS {
                let mut guard = lock.write();
                guard.0 = i;
                thread::yield_now();
                guard.1 = i * 2;
            }
            done.store(true, Ordering::SeqCst);
        }
    });

    let readers = (0..3)
        .map(|_| {
            let lock = lock.clone();
            let done = done.clone();
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let guard = lock.read();
                    assert_eq!(guard.1, guard.0 * 2, "observed a torn write!");
                    drop(guard);
                    thread::yield_now();
                }
            })
        })
        .collect::<Vec<_>>();

    writer.join().expect("writer thread mustn't panic");
    for thread in readers {
        thread.join().expect("reader thread mustn't panic");
    }
}

#[test]
fn writer_waits_for_readers_to_drain() {
    const HOLD: Duration = Duration::from_millis(100);

    let lock = Arc::new(RwLock::new(()));
    let (tx, rx) = mpsc::channel();

    let readers = (0..2)
        .map(|_| {
            let lock = lock.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let guard = lock.read();
                tx.send(()).expect("receiver must be alive");
                thread::sleep(HOLD);
                let released = Instant::now();
                drop(guard);
                released
            })
        })
        .collect::<Vec<_>>();

    // wait until both readers are inside the lock before demanding write
    // access.
    rx.recv().expect("reader must signal");
    rx.recv().expect("reader must signal");

    let write_start = Instant::now();
    let guard = lock.write();
    let write_acquired = Instant::now();
    drop(guard);

    for thread in readers {
        let released = thread.join().expect("reader thread mustn't panic");
        assert!(
            write_acquired >= released,
            "write access was granted before a reader released its hold!"
        );
    }
    assert!(
        write_acquired.duration_since(write_start) >= HOLD / 2,
        "the writer should have waited out the read holds"
    );
}

#[test]
fn queued_writer_blocks_new_readers() {
    let lock = Arc::new(RwLock::new(0));

    let read = lock.read();
    let writer = thread::spawn({
        let lock = lock.clone();
        move || {
            *lock.write() += 1;
        }
    });

    // spin until the writer is queued; from then on, new read attempts are
    // turned away.
    while lock.try_read().is_some() {
        thread::yield_now();
    }

    // the writer still can't get in while the original read hold lives.
    assert_eq!(*read, 0);
    assert!(!lock.has_writer());

    drop(read);
    writer.join().expect("writer thread mustn't panic");
    assert_eq!(*lock.read(), 1);
}

#[test]
fn writer_not_starved_by_reader_churn() {
    const READERS: usize = 4;

    util::trace_init();

    let lock = Arc::new(RwLock::new(false));
    let stop = Arc::new(AtomicBool::new(false));

    let churn = (0..READERS)
        .map(|_| {
            let lock = lock.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let guard = lock.read();
                    if *guard {
                        break;
                    }
                    drop(guard);
                }
            })
        })
        .collect::<Vec<_>>();

    // let the churn get going, then demand the write lock; acquiring it at
    // all is the point of this test.
    thread::sleep(Duration::from_millis(10));
    tracing::info!("demanding write lock");
    *lock.write() = true;
    tracing::info!("write lock acquired");

    stop.store(true, Ordering::SeqCst);
    for thread in churn {
        thread.join().expect("reader thread mustn't panic");
    }
}

#[test]
fn read_guard_released_on_panic() {
    let lock = Arc::new(RwLock::new(0));

    let result = thread::spawn({
        let lock = lock.clone();
        move || {
            let _guard = lock.read();
            panic!("poisoning? never heard of it");
        }
    })
    .join();
    assert!(result.is_err(), "thread must have panicked");

    // unwinding dropped the guard, so the lock must be free again.
    assert_eq!(lock.reader_count(), 0);
    let mut guard = lock.try_write().expect("lock must not be left read-locked");
    *guard += 1;
}

#[test]
fn write_guard_released_on_panic() {
    let lock = Arc::new(RwLock::new(0));

    let result = thread::spawn({
        let lock = lock.clone();
        move || {
            let _guard = lock.write();
            panic!("poisoning? never heard of it");
        }
    })
    .join();
    assert!(result.is_err(), "thread must have panicked");

    assert!(!lock.has_writer());
    let mut guard = lock.try_write().expect("lock must not be left write-locked");
    *guard += 1;
}

#[test]
fn with_write_releases_on_panic() {
    let lock = RwLock::new(0);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        lock.with_write(|value| {
            *value += 1;
            panic!("oh no");
        })
    }));
    assert!(result.is_err(), "closure must have panicked");

    // the write happened, and the lock was released on the way out.
    assert!(!lock.has_writer());
    assert_eq!(*lock.read(), 1);
}

#[test]
fn raw_hold_released_from_another_thread() {
    let lock = Arc::new(RawRwLock::new());
    lock.acquire_read();

    let handle = thread::spawn({
        let lock = lock.clone();
        move || {
            // holds are anonymous, so another thread may release one.
            lock.release_read();
            lock.acquire_write();
            lock.release_write();
        }
    });

    handle.join().expect("thread mustn't panic");
    assert!(!lock.is_locked());
}
