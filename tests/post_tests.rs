//! Integration tests for marshalling effects onto synchronization contexts.

use effector::effect::{Effect, Error};
use effector::env::{CancellationSignal, DedicatedContext, Disposer, Env, Job, SyncContext};
use parking_lot::Mutex;
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn thread_name() -> Effect<Option<String>> {
    Effect::lift(|| thread::current().name().map(str::to_owned))
}

/// A context that runs every job inline on the posting thread and counts
/// how many jobs it received.
#[derive(Default)]
struct Recording {
    posted: Mutex<usize>,
}

impl SyncContext for Recording {
    fn post(&self, job: Job) {
        *self.posted.lock() += 1;
        job();
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[rstest]
fn test_post_marshals_to_context_thread() {
    let context = DedicatedContext::spawn("main-loop").expect("spawn context");
    let mut env = Env::new().with_context(context);

    assert_eq!(
        thread_name().post().run_with(&mut env),
        Ok(Some("main-loop".to_string()))
    );
}

#[rstest]
fn test_post_runs_inline_when_already_on_context() {
    let context = DedicatedContext::spawn("reentrant").expect("spawn context");
    let mut env = Env::new().with_context(context);

    let nested = thread_name().post().post();
    assert_eq!(nested.run_with(&mut env), Ok(Some("reentrant".to_string())));
}

#[rstest]
fn test_post_uses_custom_context() {
    let context = Arc::new(Recording::default());
    let mut env = Env::new().with_context(context.clone());

    assert_eq!(Effect::pure(5).post().run_with(&mut env), Ok(5));
    assert_eq!(*context.posted.lock(), 1);
}

#[rstest]
fn test_post_hands_resources_back() {
    let context = DedicatedContext::spawn("resources").expect("spawn context");
    let mut env = Env::new().with_context(context);
    let released = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&released);

    let acquire = Effect::acquire(move || {
        let flag = Arc::clone(&flag);
        Ok(Disposer::new(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }))
    });
    let handle = acquire.post().run_with(&mut env).unwrap();

    assert!(env.resources().owns(handle.id()));
    env.release().unwrap();
    assert!(released.load(Ordering::SeqCst));
}

#[rstest]
fn test_cancelled_caller_abandons_wait() {
    let context = DedicatedContext::spawn("slow").expect("spawn context");
    let signal = CancellationSignal::new();
    let mut env = Env::with_signal(signal.clone()).with_context(context);
    signal.cancel_after(Duration::from_millis(20));

    let started = Instant::now();
    let slow = Effect::sleep(Duration::from_secs(30)).post();
    assert_eq!(slow.run_with(&mut env), Err(Error::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[rstest]
fn test_panic_on_context_surfaces_as_error() {
    let context = DedicatedContext::spawn("panicky").expect("spawn context");
    let mut env = Env::new().with_context(context);

    let effect = Effect::<i32>::lift(|| panic!("context job failed")).post();
    assert_eq!(
        effect.run_with(&mut env),
        Err(Error::Panicked("context job failed".to_string()))
    );
}
