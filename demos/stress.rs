//! Pushes nodes from several threads at once while a single consumer drains
//! the queue, then reports whether every node arrived.

use std::pin::Pin;
use std::process;
use std::ptr::NonNull;
use std::thread;

use intrusive_mpsc::{Node, RawQueue};

const THREADS: usize = 8;
const NODES_PER_THREAD: usize = 4096;

fn push_pop_single_thread() -> Result<(), String> {
    let (n1, n2, n3) = (Node::new(), Node::new(), Node::new());
    let mut queue = Box::pin(RawQueue::new());
    queue.as_mut().init();
    let q = queue.as_ref();

    unsafe {
        q.push(NonNull::from(&n1));
        q.push(NonNull::from(&n2));
        q.push(NonNull::from(&n3));

        for (i, expected) in [&n1, &n2, &n3].iter().enumerate() {
            if q.pop() != Some(NonNull::from(*expected)) {
                return Err(format!("pop #{} returned the wrong node", i + 1));
            }
        }

        match q.pop() {
            None => Ok(()),
            Some(_) => Err("queue not empty after draining".into()),
        }
    }
}

fn push_pop_multi_thread() -> Result<(), String> {
    let nodes: Vec<Vec<Node>> =
        (0..THREADS).map(|_| (0..NODES_PER_THREAD).map(|_| Node::new()).collect()).collect();

    let mut queue = Box::pin(RawQueue::new());
    queue.as_mut().init();
    let q: Pin<&RawQueue> = queue.as_ref();

    let mut popped = 0;
    thread::scope(|s| {
        for nodes in &nodes {
            s.spawn(move || {
                for node in nodes {
                    unsafe { q.push(NonNull::from(node)) };
                }
            });
        }

        while popped < THREADS * NODES_PER_THREAD {
            match unsafe { q.pop() } {
                Some(_) => popped += 1,
                None => thread::yield_now(),
            }
        }
    });

    if unsafe { q.pop() }.is_some() {
        return Err("popped more nodes than were pushed".into());
    }

    if popped != THREADS * NODES_PER_THREAD {
        return Err(format!("expected {} nodes, popped {}", THREADS * NODES_PER_THREAD, popped));
    }

    Ok(())
}

fn main() {
    let scenarios: [(&str, fn() -> Result<(), String>); 2] = [
        ("push_pop_single_thread", push_pop_single_thread),
        ("push_pop_multi_thread", push_pop_multi_thread),
    ];

    for (name, scenario) in scenarios.iter() {
        match scenario() {
            Ok(()) => println!("OK\t{}", name),
            Err(err) => {
                println!("KO\t{}: {}", name, err);
                process::exit(1);
            }
        }
    }

    println!("all scenarios are OK");
}
