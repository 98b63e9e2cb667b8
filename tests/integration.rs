use std::collections::HashMap;
use std::pin::Pin;
use std::ptr::NonNull;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Barrier,
};
use std::thread;

use intrusive_mpsc::{Entry, Node, RawQueue};

const THREADS: usize = 8;
const NODES_PER_THREAD: usize = 4096;

/// Checks that every `(producer, seq)` pair arrives exactly once and that each
/// producer's pairs arrive in the order they were pushed.
struct OrderCheck {
    next_seq: Vec<usize>,
    received: usize,
}

impl OrderCheck {
    fn new(producers: usize) -> Self {
        Self { next_seq: vec![0; producers], received: 0 }
    }

    fn record(&mut self, producer: usize, seq: usize) {
        assert_eq!(
            self.next_seq[producer], seq,
            "producer {}: lost, duplicated or reordered node",
            producer
        );
        self.next_seq[producer] += 1;
        self.received += 1;
    }

    fn assert_complete(&self, per_producer: usize) {
        assert!(self.next_seq.iter().all(|&seq| seq == per_producer));
        assert_eq!(self.received, self.next_seq.len() * per_producer);
    }
}

#[test]
fn raw_push_pop_multithread() {
    let nodes: Vec<Vec<Node>> =
        (0..THREADS).map(|_| (0..NODES_PER_THREAD).map(|_| Node::new()).collect()).collect();

    let origin: HashMap<usize, (usize, usize)> = nodes
        .iter()
        .enumerate()
        .flat_map(|(producer, nodes)| {
            nodes.iter().enumerate().map(move |(seq, node)| {
                (node as *const Node as usize, (producer, seq))
            })
        })
        .collect();

    let mut queue = Box::pin(RawQueue::new());
    queue.as_mut().init();
    let q: Pin<&RawQueue> = queue.as_ref();

    let barrier = Barrier::new(THREADS + 1);
    let mut check = OrderCheck::new(THREADS);
    let mut empty_polls = 0usize;

    thread::scope(|s| {
        for nodes in &nodes {
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for node in nodes {
                    unsafe { q.push(NonNull::from(node)) };
                }
            });
        }

        barrier.wait();
        while check.received < THREADS * NODES_PER_THREAD {
            match unsafe { q.pop() } {
                Some(node) => {
                    let &(producer, seq) = origin
                        .get(&(node.as_ptr() as usize))
                        .expect("popped a node that was never pushed");
                    check.record(producer, seq);
                }
                None => {
                    empty_polls += 1;
                    thread::yield_now();
                }
            }
        }
    });

    check.assert_complete(NODES_PER_THREAD);
    // all producers have finished, nothing may reappear
    for _ in 0..100 {
        assert_eq!(unsafe { q.pop() }, None);
    }

    println!("{} empty polls while draining", empty_polls);
}

#[test]
fn raw_nodes_reused_across_rounds() {
    const ROUNDS: usize = 16;
    const NODES: usize = 256;

    let nodes: Vec<Vec<Node>> =
        (0..THREADS).map(|_| (0..NODES).map(|_| Node::new()).collect()).collect();

    let mut queue = Box::pin(RawQueue::new());
    queue.as_mut().init();
    let q = queue.as_ref();

    for _ in 0..ROUNDS {
        let mut popped = 0;
        thread::scope(|s| {
            for nodes in &nodes {
                s.spawn(move || {
                    for node in nodes {
                        unsafe { q.push(NonNull::from(node)) };
                    }
                });
            }

            while popped < THREADS * NODES {
                match unsafe { q.pop() } {
                    Some(_) => popped += 1,
                    None => std::hint::spin_loop(),
                }
            }
        });

        assert_eq!(popped, THREADS * NODES);
        assert_eq!(unsafe { q.pop() }, None);
    }
}

#[test]
fn owned_push_pop_multithread() {
    let (producer, mut consumer) = intrusive_mpsc::new::<Entry<(usize, usize)>>();

    let handles: Vec<_> = (0..THREADS)
        .map(|id| {
            let producer = producer.clone();
            thread::spawn(move || {
                for seq in 0..NODES_PER_THREAD {
                    producer.push(Entry::boxed((id, seq)));
                }
            })
        })
        .collect();
    drop(producer);

    let mut check = OrderCheck::new(THREADS);
    loop {
        // sample before draining, so records pushed right before the last
        // producer is dropped are not missed
        let done = !consumer.has_producers();

        for entry in consumer.drain() {
            let (id, seq) = entry.into_inner();
            check.record(id, seq);
        }

        if done {
            break;
        }

        thread::yield_now();
    }

    for handle in handles {
        handle.join().unwrap();
    }

    check.assert_complete(NODES_PER_THREAD);
    assert!(consumer.pop().is_none());
}

struct DropCount(Arc<AtomicUsize>);

impl Drop for DropCount {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn abandoned_records_are_dropped() {
    const RECORDS: usize = 1024;

    let drop_count = Arc::new(AtomicUsize::new(0));
    let (producer, mut consumer) = intrusive_mpsc::new::<Entry<DropCount>>();
    let barrier = Arc::new(Barrier::new(2));

    let handle = {
        let drop_count = Arc::clone(&drop_count);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            for i in 0..RECORDS {
                producer.push(Entry::boxed(DropCount(Arc::clone(&drop_count))));
                if i == RECORDS / 2 {
                    barrier.wait();
                }
            }
        })
    };

    barrier.wait();
    let popped = consumer.drain().count();
    // the consumer goes away while the producer is still pushing
    drop(consumer);

    handle.join().unwrap();
    assert!(popped > 0);
    assert_eq!(drop_count.load(Ordering::Relaxed), RECORDS);
}
