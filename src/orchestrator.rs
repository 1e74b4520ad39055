use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::compute::{ComputeContext, ComputeError};
use crate::connection::{Acceptor, Connection};
use crate::error_handling::{ErrorHandler, SessionEnd};
use crate::metrics::MetricsCollector;
use crate::types::{Job, Share};
use crate::wire::{self, JOB_PACKET_LEN};

type Step = Result<ControlFlow<SessionEnd>, ComputeError>;

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(100);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingJob,
    Mining,
}

#[derive(Debug)]
pub struct Session {
    job: Option<Job>,
    cursor: u64,
    jobs: u64,
    batches: u64,
    shares: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self { job: None, cursor: 0, jobs: 0, batches: 0, shares: 0 }
    }

    pub fn state(&self) -> SessionState {
        if self.job.is_some() { SessionState::Mining } else { SessionState::AwaitingJob }
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn adopt(&mut self, job: Job) {
        self.cursor = job.start_nonce;
        self.job = Some(job);
        self.jobs += 1;
    }

    fn advance(&mut self, batch_size: u32) {
        self.cursor = self.cursor.wrapping_add(batch_size as u64);
    }
}

#[derive(Debug)]
pub struct SessionReport {
    pub peer: String,
    pub end: SessionEnd,
    pub jobs: u64,
    pub batches: u64,
    pub shares: u64,
    pub cursor: u64,
}

impl SessionReport {
    pub fn reached_mining(&self) -> bool {
        self.jobs > 0
    }
}

/// Absolute nonces of the set lanes, in lane order.
pub fn found_nonces(cursor: u64, found: &[bool]) -> impl Iterator<Item = u64> + '_ {
    found
        .iter()
        .enumerate()
        .filter(|(_, hit)| **hit)
        .map(move |(lane, _)| cursor.wrapping_add(lane as u64))
}

pub struct Orchestrator<C> {
    compute: C,
    batch_size: u32,
    metrics: Arc<MetricsCollector>,
    errors: ErrorHandler,
    stats_interval: u64,
}

impl<C: ComputeContext> Orchestrator<C> {
    pub fn new(compute: C, metrics: Arc<MetricsCollector>) -> Self {
        let batch_size = compute.batch_size();
        Self {
            compute,
            batch_size,
            errors: ErrorHandler::new(metrics.clone()),
            metrics,
            stats_interval: 0,
        }
    }

    /// Log throughput every `batches` batches; 0 disables it.
    pub fn with_stats_interval(mut self, batches: u64) -> Self {
        self.stats_interval = batches;
        self
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Accept and serve sessions one after another. Only returns on a
    /// compute failure, which the caller treats as fatal.
    pub async fn serve<A: Acceptor>(&mut self, acceptor: &mut A) -> Result<(), ComputeError> {
        let mut backoff = ACCEPT_BACKOFF_MIN;
        loop {
            info!("Waiting for connection...");
            let conn = match acceptor.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    self.errors.handle_accept_error(&e);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                    continue;
                }
            };
            backoff = ACCEPT_BACKOFF_MIN;
            self.run_session(conn).await?;
        }
    }

    pub async fn run_session<T: Connection>(&mut self, mut conn: T) -> Result<SessionReport, ComputeError> {
        let peer = conn.peer();
        info!(peer = %peer, "Accepted connection");
        self.metrics.record_session();

        let mut session = Session::new();
        let mut buf = [0u8; JOB_PACKET_LEN];

        let outcome = loop {
            let step = match session.state() {
                SessionState::AwaitingJob => self.await_job(&mut conn, &mut session, &mut buf, &peer).await,
                SessionState::Mining => self.mine_step(&mut conn, &mut session, &mut buf, &peer).await,
            };
            match step {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(end)) => break Ok(end),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = conn.close().await {
            debug!(peer = %peer, "Shutdown after session end failed: {e}");
        }

        let end = match outcome {
            Ok(end) => end,
            Err(e) => {
                self.errors.handle_compute_error(&e);
                return Err(e);
            }
        };
        self.errors.handle_session_end(&peer, &end);
        info!(
            peer = %peer,
            jobs = session.jobs,
            batches = session.batches,
            shares = session.shares,
            "Session ended"
        );
        if let Ok(json) = serde_json::to_string(&self.metrics.get_metrics()) {
            debug!(metrics = %json, "Totals");
        }

        Ok(SessionReport {
            peer,
            end,
            jobs: session.jobs,
            batches: session.batches,
            shares: session.shares,
            cursor: session.cursor,
        })
    }

    async fn await_job<T: Connection>(
        &mut self,
        conn: &mut T,
        session: &mut Session,
        buf: &mut [u8; JOB_PACKET_LEN],
        peer: &str,
    ) -> Step {
        match conn.recv(buf).await {
            Ok(0) => Ok(ControlFlow::Break(SessionEnd::PeerClosed)),
            Ok(n) => {
                self.handle_packet(session, &buf[..n], peer)?;
                Ok(ControlFlow::Continue(()))
            }
            Err(e) => Ok(ControlFlow::Break(SessionEnd::ReadFailed(e))),
        }
    }

    async fn mine_step<T: Connection>(
        &mut self,
        conn: &mut T,
        session: &mut Session,
        buf: &mut [u8; JOB_PACKET_LEN],
        peer: &str,
    ) -> Step {
        match conn.poll_recv(buf).await {
            Ok(None) => self.run_batch(conn, session, peer).await,
            Ok(Some(0)) => Ok(ControlFlow::Break(SessionEnd::PeerClosed)),
            Ok(Some(n)) => {
                self.handle_packet(session, &buf[..n], peer)?;
                Ok(ControlFlow::Continue(()))
            }
            Err(e) => Ok(ControlFlow::Break(SessionEnd::PollFailed(e))),
        }
    }

    fn handle_packet(&mut self, session: &mut Session, packet: &[u8], peer: &str) -> Result<(), ComputeError> {
        match wire::decode_job(packet) {
            Ok(job) => self.adopt_job(session, job, peer),
            Err(e) => {
                self.errors.handle_short_packet(peer, &e);
                Ok(())
            }
        }
    }

    fn adopt_job(&mut self, session: &mut Session, job: Job, peer: &str) -> Result<(), ComputeError> {
        // The midstate goes in before the job is adopted so no batch can pair
        // the new job with the old buffer.
        self.compute.install_midstate(&job.midstate)?;
        info!(
            peer,
            difficulty_mask = %format!("{:#010x}", job.difficulty_mask),
            start_nonce = job.start_nonce,
            prehash = %hex::encode(&job.prehash[..8]),
            "New job"
        );
        self.metrics.record_job();
        session.adopt(job);
        Ok(())
    }

    async fn run_batch<T: Connection>(&mut self, conn: &mut T, session: &mut Session, peer: &str) -> Step {
        let Some(job) = session.job.as_ref() else {
            return Ok(ControlFlow::Continue(()));
        };
        let cursor = session.cursor;

        let started = Instant::now();
        let found = self.compute.submit_batch(cursor, job.difficulty_mask)?;
        let elapsed = started.elapsed();
        if found.len() != self.batch_size as usize {
            return Err(ComputeError::ResultLength { expected: self.batch_size as usize, got: found.len() });
        }

        let shares: Vec<Share> = found_nonces(cursor, &found)
            .map(|nonce| Share { prehash: job.prehash, nonce })
            .collect();
        self.metrics.record_batch(self.batch_size, shares.len(), elapsed);
        session.batches += 1;
        session.shares += shares.len() as u64;

        for share in &shares {
            trace!(peer, nonce = share.nonce, "Share");
            if let Err(e) = conn.send(&wire::encode_share(share)).await {
                return Ok(ControlFlow::Break(SessionEnd::SendFailed(e)));
            }
        }
        if !shares.is_empty() {
            debug!(peer, cursor, count = shares.len(), "Shares sent");
        }

        session.advance(self.batch_size);
        self.log_stats(session);
        Ok(ControlFlow::Continue(()))
    }

    fn stats_due(&self, batches: u64) -> bool {
        self.stats_interval != 0 && batches % self.stats_interval == 0
    }

    fn log_stats(&self, session: &Session) {
        if !self.stats_due(session.batches) {
            return;
        }
        let m = self.metrics.get_metrics();
        info!(
            batches = session.batches,
            cursor = session.cursor,
            hashrate = %format!("{:.2} MH/s", m.hashrate / 1e6),
            avg_batch_ms = %format!("{:.2}", m.average_batch_ms),
            shares = m.shares_found,
            "Search progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sha::Midstate;
    use crate::wire::{decode_share, encode_job, SHARE_PACKET_LEN};
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;

    enum Event {
        Packet(Vec<u8>),
        Idle,
        Close,
        PollError,
    }

    struct ScriptedConnection {
        script: VecDeque<Event>,
        sent: Arc<Mutex<Vec<u8>>>,
        fail_sends: bool,
    }

    impl ScriptedConnection {
        fn new(script: Vec<Event>) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let conn = Self { script: script.into(), sent: sent.clone(), fail_sends: false };
            (conn, sent)
        }

        fn deliver(buf: &mut [u8], packet: &[u8]) -> usize {
            buf[..packet.len()].copy_from_slice(packet);
            packet.len()
        }
    }

    impl Connection for ScriptedConnection {
        fn peer(&self) -> String {
            "scripted".to_string()
        }

        async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            loop {
                match self.script.pop_front() {
                    Some(Event::Packet(p)) => return Ok(Self::deliver(buf, &p)),
                    Some(Event::Idle) => continue,
                    Some(Event::PollError) => return Err(io::Error::from(io::ErrorKind::ConnectionReset)),
                    Some(Event::Close) | None => return Ok(0),
                }
            }
        }

        async fn poll_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
            match self.script.pop_front() {
                Some(Event::Packet(p)) => Ok(Some(Self::deliver(buf, &p))),
                Some(Event::Idle) => Ok(None),
                Some(Event::PollError) => Err(io::Error::from(io::ErrorKind::ConnectionReset)),
                Some(Event::Close) | None => Ok(Some(0)),
            }
        }

        async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            if self.fail_sends {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.sent.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }

        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct ComputeLog {
        installs: Vec<Midstate>,
        submits: Vec<(u64, u32)>,
    }

    struct RecordingCompute {
        batch_size: u32,
        hit: fn(u64) -> bool,
        fail_submit: bool,
        log: Arc<Mutex<ComputeLog>>,
    }

    impl RecordingCompute {
        fn new(batch_size: u32, hit: fn(u64) -> bool) -> (Self, Arc<Mutex<ComputeLog>>) {
            let log = Arc::new(Mutex::new(ComputeLog::default()));
            (Self { batch_size, hit, fail_submit: false, log: log.clone() }, log)
        }
    }

    impl ComputeContext for RecordingCompute {
        fn batch_size(&self) -> u32 {
            self.batch_size
        }

        fn install_midstate(&mut self, midstate: &Midstate) -> Result<(), ComputeError> {
            self.log.lock().unwrap().installs.push(*midstate);
            Ok(())
        }

        fn submit_batch(&mut self, cursor: u64, difficulty_mask: u32) -> Result<Vec<bool>, ComputeError> {
            if self.fail_submit {
                return Err(ComputeError::OpenCl("device lost".to_string()));
            }
            self.log.lock().unwrap().submits.push((cursor, difficulty_mask));
            Ok((0..self.batch_size as u64).map(|i| (self.hit)(cursor.wrapping_add(i))).collect())
        }
    }

    fn job(tag: u8, mask: u32, start: u64) -> Job {
        Job::new(mask, start, [tag; 64])
    }

    fn packet(job: &Job) -> Event {
        Event::Packet(encode_job(job).to_vec())
    }

    fn shares(sent: &Arc<Mutex<Vec<u8>>>) -> Vec<Share> {
        sent.lock()
            .unwrap()
            .chunks(SHARE_PACKET_LEN)
            .map(|c| decode_share(c).unwrap())
            .collect()
    }

    fn orchestrator(compute: RecordingCompute) -> (Orchestrator<RecordingCompute>, Arc<MetricsCollector>) {
        let metrics = Arc::new(MetricsCollector::new());
        (Orchestrator::new(compute, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn cursor_advances_by_batch_size() {
        let (compute, log) = RecordingCompute::new(4, |_| false);
        let (mut orch, _) = orchestrator(compute);
        let a = job(1, 0xffff_0000, 100);
        let (conn, _) = ScriptedConnection::new(vec![packet(&a), Event::Idle, Event::Idle, Event::Idle, Event::Close]);

        let report = orch.run_session(conn).await.unwrap();

        let cursors: Vec<u64> = log.lock().unwrap().submits.iter().map(|s| s.0).collect();
        assert_eq!(cursors, vec![100, 104, 108]);
        assert_eq!(report.cursor, 112);
        assert_eq!(report.batches, 3);
        assert!(report.end.is_clean());
    }

    #[tokio::test]
    async fn new_job_resets_cursor_and_midstate() {
        let (compute, log) = RecordingCompute::new(4, |_| false);
        let (mut orch, _) = orchestrator(compute);
        let a = job(1, 0xff00_0000, 0);
        let b = job(2, 0x0000_ffff, 5_000);
        let (conn, _) = ScriptedConnection::new(vec![
            packet(&a), Event::Idle, Event::Idle, packet(&b), Event::Idle, Event::Close,
        ]);

        let report = orch.run_session(conn).await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.submits, vec![(0, a.difficulty_mask), (4, a.difficulty_mask), (5_000, b.difficulty_mask)]);
        assert_eq!(log.installs, vec![a.midstate, b.midstate]);
        assert_eq!(report.jobs, 2);
        assert_eq!(report.cursor, 5_004);
    }

    #[tokio::test]
    async fn short_packet_leaves_job_and_cursor_alone() {
        let (compute, log) = RecordingCompute::new(4, |_| false);
        let (mut orch, metrics) = orchestrator(compute);
        let a = job(1, 0, 40);
        let b = job(2, 0, 9_000);
        let truncated = encode_job(&b)[..75].to_vec();
        let (conn, _) = ScriptedConnection::new(vec![
            packet(&a), Event::Idle, Event::Packet(truncated), Event::Idle, Event::Close,
        ]);

        let report = orch.run_session(conn).await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.submits, vec![(40, 0), (44, 0)]);
        assert_eq!(log.installs, vec![a.midstate]);
        assert_eq!(report.jobs, 1);
        assert_eq!(metrics.get_metrics().short_packets, 1);
    }

    #[tokio::test]
    async fn shares_carry_the_job_active_at_submission() {
        let (compute, _) = RecordingCompute::new(4, |nonce| nonce % 2 == 0);
        let (mut orch, _) = orchestrator(compute);
        let a = job(0xaa, 0, 0);
        let b = job(0xbb, 0, 11);
        let (conn, sent) = ScriptedConnection::new(vec![
            packet(&a), Event::Idle, packet(&b), Event::Idle, Event::Close,
        ]);

        let report = orch.run_session(conn).await.unwrap();
        let shares = shares(&sent);

        assert_eq!(report.shares, 4);
        assert_eq!(shares.iter().map(|s| s.nonce).collect::<Vec<_>>(), vec![0, 2, 12, 14]);
        for share in &shares[..2] {
            assert_eq!(share.prehash, a.prehash);
            assert!((0..4).contains(&share.nonce));
        }
        for share in &shares[2..] {
            assert_eq!(share.prehash, b.prehash);
            assert!((11..15).contains(&share.nonce));
        }
    }

    #[tokio::test]
    async fn replaced_job_before_first_batch_is_never_mined() {
        let (compute, log) = RecordingCompute::new(8, |_| true);
        let (mut orch, _) = orchestrator(compute);
        let a = job(1, 0, 0);
        let b = job(2, 0, 1_000_000);
        let (conn, sent) = ScriptedConnection::new(vec![packet(&a), packet(&b), Event::Idle, Event::Close]);

        orch.run_session(conn).await.unwrap();

        assert_eq!(log.lock().unwrap().submits, vec![(1_000_000, 0)]);
        let shares = shares(&sent);
        assert_eq!(shares.len(), 8);
        for (i, share) in shares.iter().enumerate() {
            assert_eq!(share.prehash, b.prehash);
            assert_eq!(share.nonce, 1_000_000 + i as u64);
        }
    }

    #[tokio::test]
    async fn short_first_packet_never_starts_mining() {
        let (compute, log) = RecordingCompute::new(8, |_| true);
        let (mut orch, metrics) = orchestrator(compute);
        let a = job(1, 0, 0);
        let (conn, sent) = ScriptedConnection::new(vec![Event::Packet(encode_job(&a)[..75].to_vec()), Event::Close]);

        let report = orch.run_session(conn).await.unwrap();

        assert!(!report.reached_mining());
        assert!(report.end.is_clean());
        assert!(log.lock().unwrap().installs.is_empty());
        assert!(log.lock().unwrap().submits.is_empty());
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(metrics.get_metrics().short_packets, 1);
    }

    #[tokio::test]
    async fn poll_error_ends_session() {
        let (compute, _) = RecordingCompute::new(4, |_| false);
        let (mut orch, metrics) = orchestrator(compute);
        let (conn, _) = ScriptedConnection::new(vec![packet(&job(1, 0, 0)), Event::Idle, Event::PollError]);

        let report = orch.run_session(conn).await.unwrap();

        assert!(matches!(report.end, SessionEnd::PollFailed(_)));
        assert_eq!(report.batches, 1);
        assert_eq!(metrics.get_metrics().disconnects, 1);
    }

    #[tokio::test]
    async fn read_error_while_awaiting_job_ends_session() {
        let (compute, log) = RecordingCompute::new(4, |_| true);
        let (mut orch, metrics) = orchestrator(compute);
        let (conn, sent) = ScriptedConnection::new(vec![Event::PollError]);

        let report = orch.run_session(conn).await.unwrap();

        assert!(matches!(report.end, SessionEnd::ReadFailed(_)));
        assert!(!report.reached_mining());
        assert!(log.lock().unwrap().submits.is_empty());
        assert!(sent.lock().unwrap().is_empty());
        let snap = metrics.get_metrics();
        assert_eq!(snap.short_packets, 0);
        assert_eq!(snap.network_errors, 1);
        assert_eq!(snap.disconnects, 1);
    }

    #[tokio::test]
    async fn failed_send_ends_session() {
        let (compute, _) = RecordingCompute::new(4, |_| true);
        let (mut orch, _) = orchestrator(compute);
        let (mut conn, _) = ScriptedConnection::new(vec![packet(&job(1, 0, 0)), Event::Idle, Event::Idle]);
        conn.fail_sends = true;

        let report = orch.run_session(conn).await.unwrap();

        assert!(matches!(report.end, SessionEnd::SendFailed(_)));
        assert_eq!(report.batches, 1);
    }

    #[tokio::test]
    async fn compute_failure_is_fatal() {
        let (mut compute, _) = RecordingCompute::new(4, |_| true);
        compute.fail_submit = true;
        let (mut orch, metrics) = orchestrator(compute);
        let (conn, sent) = ScriptedConnection::new(vec![packet(&job(1, 0, 0)), Event::Idle, Event::Idle]);

        let err = orch.run_session(conn).await.unwrap_err();

        assert!(matches!(err, ComputeError::OpenCl(_)));
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(metrics.get_metrics().compute_errors, 1);
    }

    #[tokio::test]
    async fn cursor_wraps_at_end_of_nonce_space() {
        let (compute, log) = RecordingCompute::new(4, |_| false);
        let (mut orch, _) = orchestrator(compute);
        let (conn, _) = ScriptedConnection::new(vec![packet(&job(1, 0, u64::MAX - 1)), Event::Idle, Event::Idle, Event::Close]);

        let report = orch.run_session(conn).await.unwrap();

        let cursors: Vec<u64> = log.lock().unwrap().submits.iter().map(|s| s.0).collect();
        assert_eq!(cursors, vec![u64::MAX - 1, 2]);
        assert_eq!(report.cursor, 6);
    }

    struct ScriptedAcceptor {
        conns: VecDeque<ScriptedConnection>,
    }

    impl Acceptor for ScriptedAcceptor {
        type Conn = ScriptedConnection;

        async fn accept(&mut self) -> io::Result<ScriptedConnection> {
            self.conns
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no more clients"))
        }
    }

    struct FailingAcceptor {
        calls: usize,
    }

    impl Acceptor for FailingAcceptor {
        type Conn = ScriptedConnection;

        async fn accept(&mut self) -> io::Result<ScriptedConnection> {
            self.calls += 1;
            Err(io::Error::from_raw_os_error(24))
        }
    }

    #[tokio::test]
    async fn accept_errors_back_off() {
        let (compute, _) = RecordingCompute::new(4, |_| false);
        let (mut orch, metrics) = orchestrator(compute);
        let mut acceptor = FailingAcceptor { calls: 0 };

        let res = tokio::time::timeout(Duration::from_millis(250), orch.serve(&mut acceptor)).await;

        assert!(res.is_err());
        // 0ms, 100ms, 300ms: at most a handful of attempts fit in the window.
        assert!((1..=3).contains(&acceptor.calls), "accept called {} times", acceptor.calls);
        assert_eq!(metrics.get_metrics().network_errors, acceptor.calls as u64);
    }

    #[tokio::test]
    async fn serve_survives_disconnects_and_stops_on_compute_failure() {
        let (mut compute, _) = RecordingCompute::new(4, |_| true);
        compute.fail_submit = true;
        let (mut orch, metrics) = orchestrator(compute);
        let (first, _) = ScriptedConnection::new(vec![Event::Close]);
        let (second, _) = ScriptedConnection::new(vec![packet(&job(1, 0, 0)), Event::Idle]);
        let mut acceptor = ScriptedAcceptor { conns: VecDeque::from(vec![first, second]) };

        let err = orch.serve(&mut acceptor).await.unwrap_err();

        assert!(matches!(err, ComputeError::OpenCl(_)));
        let snap = metrics.get_metrics();
        assert_eq!(snap.sessions, 2);
        assert_eq!(snap.disconnects, 1);
    }

    #[test]
    fn stats_fire_on_multiples_of_interval() {
        let (compute, _) = RecordingCompute::new(4, |_| false);
        let (orch, _) = orchestrator(compute);
        let orch = orch.with_stats_interval(2);
        let due: Vec<u64> = (1..=6).filter(|&b| orch.stats_due(b)).collect();
        assert_eq!(due, vec![2, 4, 6]);

        let (compute, _) = RecordingCompute::new(4, |_| false);
        let (silent, _) = orchestrator(compute);
        assert!((1..=6).all(|b| !silent.stats_due(b)));
    }

    #[tokio::test]
    async fn stats_interval_does_not_disturb_the_batch_loop() {
        let (compute, log) = RecordingCompute::new(4, |_| false);
        let (orch, _) = orchestrator(compute);
        let mut orch = orch.with_stats_interval(2);
        let (conn, _) = ScriptedConnection::new(vec![
            packet(&job(1, 0, 0)), Event::Idle, Event::Idle, Event::Idle, Event::Close,
        ]);

        let report = orch.run_session(conn).await.unwrap();

        assert_eq!(report.batches, 3);
        assert_eq!(log.lock().unwrap().submits.len(), 3);
    }

    #[test]
    fn found_nonces_maps_lanes_onto_cursor() {
        let found = [false, true, false, true, true];
        assert_eq!(found_nonces(10, &found).collect::<Vec<_>>(), vec![11, 13, 14]);
        assert_eq!(found_nonces(u64::MAX, &[true, true]).collect::<Vec<_>>(), vec![u64::MAX, 0]);
    }

    #[test]
    fn fresh_session_awaits_a_job() {
        let session = Session::new();
        assert_eq!(session.state(), SessionState::AwaitingJob);
        assert!(session.job().is_none());
        assert_eq!(session.cursor(), 0);
    }
}
