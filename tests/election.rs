use std::fs::File;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use soliton::{
    CommandExecutor, ExecFunc, ExecutorState, InstanceConfig, InstanceError, LockFile,
};
use tempfile::tempdir;

/// Application stand-in that records every dispatched argv.
struct Recorder {
    sender: mpsc::Sender<Vec<String>>,
}

fn recorder_func() -> ExecFunc<Recorder> {
    Arc::new(|app: &Recorder, argv: &[String]| {
        let _ = app.sender.send(argv.to_vec());
    })
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_leader_then_follower_forwarding() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempdir().unwrap();
    let config = InstanceConfig::new(dir.path().join("app.lock"));
    let (tx, rx) = mpsc::channel();

    let leader = CommandExecutor::new(config.clone());
    assert!(leader.setup(recorder_func()).unwrap());
    assert_eq!(leader.state(), ExecutorState::Leader);
    leader.set_app(Recorder { sender: tx });

    // A second invocation on the same lock path must observe the
    // follower role with a record naming the leader's live port.
    let follower = CommandExecutor::new(config);
    assert!(!follower.setup(recorder_func()).unwrap());
    assert_eq!(follower.state(), ExecutorState::Follower);

    follower.execute(&argv(&["note", "open"])).unwrap();
    let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(received, argv(&["note", "open"]));

    // The follower's connection is one-shot.
    assert!(matches!(
        follower.execute(&argv(&["again"])),
        Err(InstanceError::AlreadySent)
    ));
}

#[test]
fn test_leader_executes_locally_and_synchronously() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempdir().unwrap();
    let config = InstanceConfig::new(dir.path().join("app.lock"));
    let (tx, rx) = mpsc::channel();

    let leader = CommandExecutor::new(config);
    assert!(leader.setup(recorder_func()).unwrap());
    leader.set_app(Recorder { sender: tx });

    leader.execute(&argv(&["open", "notebook"])).unwrap();
    // Local dispatch happens in the calling thread, so the command is
    // already in the channel.
    assert_eq!(rx.try_recv().unwrap(), argv(&["open", "notebook"]));
}

#[test]
fn test_lock_record_matches_bound_port() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempdir().unwrap();
    let lock_path = dir.path().join("app.lock");
    let config = InstanceConfig::new(&lock_path);
    let (tx, _rx) = mpsc::channel();

    let leader = CommandExecutor::new(config.clone());
    assert!(leader.setup(recorder_func()).unwrap());
    leader.set_app(Recorder { sender: tx });

    let mut file = File::open(&lock_path).unwrap();
    let record = LockFile::read_record(&mut file).unwrap();
    assert!((config.start_port..=config.end_port).contains(&record.port));

    // The recorded port is actually reachable: a follower election
    // against it succeeds.
    let follower: CommandExecutor<Recorder> = CommandExecutor::new(config);
    assert!(!follower.setup(recorder_func()).unwrap());
}

#[test]
fn test_concurrent_election_elects_single_leader() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempdir().unwrap();
    let lock_path = dir.path().join("app.lock");

    // Several invocations race for one fresh lock path at the same
    // time. The executors ride along in the results so nobody's lock
    // guard cleans up mid-race.
    let mut handles = Vec::new();
    for _ in 0..4 {
        let lock_path = lock_path.clone();
        handles.push(std::thread::spawn(move || {
            let executor: CommandExecutor<Recorder> =
                CommandExecutor::new(InstanceConfig::new(&lock_path));
            let is_leader = executor.setup(recorder_func()).unwrap();
            (is_leader, executor)
        }));
    }
    let results: Vec<(bool, CommandExecutor<Recorder>)> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let leaders = results.iter().filter(|(is_leader, _)| *is_leader).count();
    assert_eq!(leaders, 1, "exactly one invocation may win the election");
    for (is_leader, executor) in &results {
        let expected = if *is_leader {
            ExecutorState::Leader
        } else {
            ExecutorState::Follower
        };
        assert_eq!(executor.state(), expected);
    }
}

#[test]
fn test_stale_lock_recovery() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempdir().unwrap();
    let lock_path = dir.path().join("app.lock");

    // A lock file naming a port nothing listens on: the port of a
    // listener that has already been dropped.
    let dead_port = {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.local_addr().unwrap().port()
    };
    std::fs::write(&lock_path, format!("{}:12345", dead_port)).unwrap();

    let executor: CommandExecutor<Recorder> =
        CommandExecutor::new(InstanceConfig::new(&lock_path));
    // First attempt hits the dead leader, purges the lock, and the
    // retry promotes this process.
    assert!(executor.setup(recorder_func()).unwrap());
    assert_eq!(executor.state(), ExecutorState::Leader);
}

#[test]
fn test_garbage_lock_recovery() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempdir().unwrap();
    let lock_path = dir.path().join("app.lock");
    std::fs::write(&lock_path, "not a record at all").unwrap();

    let executor: CommandExecutor<Recorder> =
        CommandExecutor::new(InstanceConfig::new(&lock_path));
    assert!(executor.setup(recorder_func()).unwrap());
}

#[cfg(unix)]
#[test]
fn test_exhausted_retries_are_fatal() {
    let _ = env_logger::builder().is_test(true).try_init();
    // A directory at the lock path can be neither acquired nor read nor
    // removed, so every election attempt fails.
    let dir = tempdir().unwrap();
    let config = InstanceConfig::new(dir.path());

    let executor: CommandExecutor<Recorder> = CommandExecutor::new(config);
    assert!(matches!(
        executor.setup(recorder_func()),
        Err(InstanceError::LockUnavailable(2))
    ));
    assert_eq!(executor.state(), ExecutorState::Fatal);
}
