//! Bounded job queue between carriers and workers.
//!
//! Carriers push, workers pop. A full queue makes carriers wait, which
//! stops them reading their sockets; TCP flow control then pushes back on
//! clients. Once closed and drained, `pop` returns `None`.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::connection::Connection;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// One request read off a connection, waiting for a worker.
#[derive(Debug)]
pub struct Job {
    /// Complete request frame bytes.
    pub frame: Bytes,
    /// Connection to answer on.
    pub conn: Arc<Connection>,
}

impl Job {
    pub fn new(frame: Bytes, conn: Arc<Connection>) -> Self {
        Self { frame, conn }
    }
}

/// Multi-producer multi-consumer bounded FIFO of [`Job`]s.
#[derive(Debug)]
pub(crate) struct JobQueue {
    tx: Mutex<Option<flume::Sender<Job>>>,
    rx: flume::Receiver<Job>,
    capacity: usize,
}

impl JobQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = flume::bounded(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            capacity,
        }
    }

    /// A producer handle, or `None` once the queue is closed.
    pub(crate) fn sender(&self) -> Option<JobSender> {
        self.tx.lock().as_ref().map(|tx| JobSender { tx: tx.clone() })
    }

    /// A consumer handle.
    pub(crate) fn receiver(&self) -> JobReceiver {
        JobReceiver {
            rx: self.rx.clone(),
        }
    }

    /// Stop handing out producers. Consumers see `None` once every
    /// outstanding producer is gone and the backlog is drained.
    pub(crate) fn close(&self) {
        self.tx.lock().take();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Jobs waiting for a worker.
    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Producer side, owned by one carrier.
#[derive(Debug, Clone)]
pub(crate) struct JobSender {
    tx: flume::Sender<Job>,
}

impl JobSender {
    /// Enqueue a job, waiting while the queue is full.
    ///
    /// Gives the job back if every consumer is gone.
    pub(crate) async fn push(&self, job: Job) -> Result<(), Job> {
        self.tx.send_async(job).await.map_err(|e| e.into_inner())
    }
}

/// Consumer side, owned by one worker.
#[derive(Debug, Clone)]
pub(crate) struct JobReceiver {
    rx: flume::Receiver<Job>,
}

impl JobReceiver {
    /// Next job in FIFO order, or `None` once the queue is closed and
    /// empty.
    pub(crate) async fn pop(&self) -> Option<Job> {
        self.rx.recv_async().await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    async fn test_conn() -> (Arc<Connection>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (stream, peer) = accepted.unwrap();
        let (_reader, writer) = stream.into_split();
        (Arc::new(Connection::new(1, peer, writer, None)), client.unwrap())
    }

    fn job(conn: &Arc<Connection>, tag: &'static [u8]) -> Job {
        Job::new(Bytes::from_static(tag), conn.clone())
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (conn, _client) = test_conn().await;
        let queue = JobQueue::new(8);
        let tx = queue.sender().unwrap();
        let rx = queue.receiver();

        for tag in [&b"a"[..], b"b", b"c"] {
            tx.push(job(&conn, tag)).await.unwrap();
        }
        assert_eq!(queue.len(), 3);

        for tag in [&b"a"[..], b"b", b"c"] {
            assert_eq!(&rx.pop().await.unwrap().frame[..], tag);
        }
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_push_waits_when_full() {
        let (conn, _client) = test_conn().await;
        let queue = JobQueue::new(1);
        let tx = queue.sender().unwrap();
        let rx = queue.receiver();

        tx.push(job(&conn, b"first")).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.push(job(&conn, b"second"))).await;
        assert!(blocked.is_err(), "push should wait on a full queue");

        let pusher = {
            let tx = tx.clone();
            let conn = conn.clone();
            tokio::spawn(async move { tx.push(job(&conn, b"third")).await })
        };

        assert_eq!(&rx.pop().await.unwrap().frame[..], b"first");
        pusher.await.unwrap().unwrap();
        assert_eq!(&rx.pop().await.unwrap().frame[..], b"third");
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (conn, _client) = test_conn().await;
        let queue = JobQueue::new(4);
        let tx = queue.sender().unwrap();
        let rx = queue.receiver();

        tx.push(job(&conn, b"left over")).await.unwrap();
        drop(tx);
        queue.close();

        assert!(queue.is_closed());
        assert!(queue.sender().is_none());
        assert_eq!(&rx.pop().await.unwrap().frame[..], b"left over");
        assert!(rx.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_pop_waits_for_outstanding_senders() {
        let (conn, _client) = test_conn().await;
        let queue = JobQueue::new(4);
        let tx = queue.sender().unwrap();
        let rx = queue.receiver();
        queue.close();

        let late = tokio::spawn(async move {
            tx.push(job(&conn, b"late")).await.unwrap();
        });

        assert_eq!(&rx.pop().await.unwrap().frame[..], b"late");
        late.await.unwrap();
        assert!(rx.pop().await.is_none());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let queue = JobQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }
}
