//! Behavioural tests for the control channel: framing, status replies and
//! connection handling over a real Unix socket.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use cgproxy_config::SocketEndpoint;
use cgproxy_daemon_types::ControlRequest;

use crate::dispatch::{DispatchConnectionHandler, MAX_REQUEST_BYTES};
use crate::tests::support::{PlaneHarness, config_json};
use crate::transport::{ListenerHandle, SocketListener};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<ChannelWorld> {
    RefCell::new(ChannelWorld::new())
}

#[given("a running control channel")]
fn given_running_channel(world: &RefCell<ChannelWorld>) -> StepResult {
    world.borrow_mut().start()
}

#[when("the client pushes a configuration with proxy cgroup {cgroup}")]
fn when_client_pushes(world: &RefCell<ChannelWorld>, cgroup: String) -> StepResult {
    let request = ControlRequest::push_config(config_json(&cgroup, "/noproxy.slice"));
    world.borrow_mut().send_request(&request)
}

#[when("the client classifies pid {pid} as proxied")]
fn when_client_classifies(world: &RefCell<ChannelWorld>, pid: u32) -> StepResult {
    world
        .borrow_mut()
        .send_request(&ControlRequest::classify_proxied(pid))
}

#[when("the client sends message type {kind}")]
fn when_client_sends_type(world: &RefCell<ChannelWorld>, kind: i64) -> StepResult {
    let line = format!("{{\"type\":{kind},\"data\":0}}\n");
    world.borrow_mut().send_line(line.as_bytes())
}

#[when("the rule backend rejects installs")]
fn when_backend_rejects(world: &RefCell<ChannelWorld>) {
    world.borrow().harness.rules.fail_install(true);
}

#[when("the client sends an oversized request")]
fn when_client_sends_oversized(world: &RefCell<ChannelWorld>) -> StepResult {
    // Exactly one byte over the limit and no terminator, so nothing is left
    // unread when the daemon hangs up.
    let length = usize::try_from(MAX_REQUEST_BYTES + 1).map_err(|error| error.to_string())?;
    world.borrow_mut().send_line(&vec![b'a'; length])
}

#[then("the reply is status {status}")]
fn then_reply_status(world: &RefCell<ChannelWorld>, status: i32) {
    assert_eq!(world.borrow().last_reply, Some(status));
}

#[then("the attacher moved pid {pid} into {cgroup}")]
fn then_attacher_moved(world: &RefCell<ChannelWorld>, pid: u32, cgroup: String) {
    let attached = world.borrow().harness.attacher.attached();
    assert!(
        attached.contains(&(pid, cgroup)),
        "unexpected attach calls: {attached:?}"
    );
}

#[then("no diversion rules are installed")]
fn then_no_rules(world: &RefCell<ChannelWorld>) {
    let world = world.borrow();
    assert_eq!(world.harness.rules.live(), None);
    assert!(!world.harness.plane.status().rules_installed());
}

#[then("the connection is closed")]
fn then_connection_closed(world: &RefCell<ChannelWorld>) {
    let mut world = world.borrow_mut();
    let reader = world.reader.as_mut().expect("client connected");
    let mut rest = String::new();
    // Linux may surface the hang-up as a reset instead of a clean EOF.
    if let Ok(read) = reader.read_line(&mut rest) {
        assert_eq!(read, 0, "expected hang-up, got {rest:?}");
    }
}

#[scenario(path = "tests/features/control_channel.feature")]
fn control_channel(#[from(world)] world: RefCell<ChannelWorld>) {
    drop(world);
}

struct ChannelWorld {
    dir: TempDir,
    harness: PlaneHarness,
    listener: Option<ListenerHandle>,
    writer: Option<UnixStream>,
    reader: Option<BufReader<UnixStream>>,
    last_reply: Option<i32>,
}

impl ChannelWorld {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
            harness: PlaneHarness::running(),
            listener: None,
            writer: None,
            reader: None,
            last_reply: None,
        }
    }

    fn socket_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().join("cgproxy.sock")).expect("utf-8 path")
    }

    fn start(&mut self) -> StepResult {
        let path = self.socket_path();
        let listener =
            SocketListener::bind(&SocketEndpoint::unix(&path)).map_err(|e| e.to_string())?;
        let handler = Arc::new(DispatchConnectionHandler::new(self.harness.plane.clone()));
        self.listener = Some(listener.start(handler).map_err(|e| e.to_string())?);

        let stream = UnixStream::connect(&path).map_err(|e| e.to_string())?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| e.to_string())?;
        self.reader = Some(BufReader::new(
            stream.try_clone().map_err(|e| e.to_string())?,
        ));
        self.writer = Some(stream);
        Ok(())
    }

    fn send_request(&mut self, request: &ControlRequest) -> StepResult {
        let line = request.to_line().map_err(|e| e.to_string())?;
        self.send_line(line.as_bytes())
    }

    fn send_line(&mut self, bytes: &[u8]) -> StepResult {
        let writer = self.writer.as_mut().ok_or("client not connected")?;
        writer.write_all(bytes).map_err(|e| e.to_string())?;

        let reader = self.reader.as_mut().ok_or("client not connected")?;
        let mut reply = String::new();
        reader.read_line(&mut reply).map_err(|e| e.to_string())?;
        let status = reply
            .trim_end()
            .parse()
            .map_err(|_| format!("malformed reply {reply:?}"))?;
        self.last_reply = Some(status);
        Ok(())
    }
}

impl Drop for ChannelWorld {
    fn drop(&mut self) {
        self.writer.take();
        self.reader.take();
        if let Some(handle) = self.listener.take() {
            handle.shutdown();
            let _ = handle.join();
        }
    }
}
