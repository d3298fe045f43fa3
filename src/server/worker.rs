//! Worker tasks: decode, dispatch, encode, respond.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use super::queue::{Job, JobReceiver};
use super::shutdown::ShutdownController;
use crate::codec::{EncodePayload, WireCodec, WrappedError};
use crate::handler::{CallContext, HandlerReply, MethodRegistry};

/// One worker in the fixed-size pool.
pub(crate) struct Worker {
    index: usize,
    jobs: JobReceiver,
    registry: Arc<MethodRegistry>,
    codec: WireCodec,
    shutdown: ShutdownController,
}

impl Worker {
    pub(crate) fn new(
        index: usize,
        jobs: JobReceiver,
        registry: Arc<MethodRegistry>,
        codec: WireCodec,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            index,
            jobs,
            registry,
            codec,
            shutdown,
        }
    }

    /// Process jobs until the queue is closed and drained.
    pub(crate) async fn run(self) {
        tracing::debug!("Worker {} started", self.index);
        while let Some(job) = self.jobs.pop().await {
            self.handle(job).await;
        }
        tracing::debug!("Worker {} exiting, job queue closed", self.index);
    }

    async fn handle(&self, job: Job) {
        let Job { frame, conn } = job;

        let reply = self.execute(&frame, conn.peer_addr()).await;
        let Some(encoded) = self.encode(&reply) else {
            return;
        };

        if let Err(e) = conn.write_frame(&encoded).await {
            tracing::warn!("Failed to write response on connection {}: {}", conn.id(), e);
            return;
        }

        if self.shutdown.is_stopping() {
            if let Err(e) = conn.close().await {
                tracing::debug!("Failed to close connection {}: {}", conn.id(), e);
            }
        }
    }

    /// Decode and run the handler. Decode failures become business-error
    /// replies.
    async fn execute(&self, frame: &Bytes, peer_addr: SocketAddr) -> HandlerReply {
        let request = match self.codec.decode_request(frame, &self.registry) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Failed to decode request from {}: {}", peer_addr, e);
                return HandlerReply::err(e.to_string());
            }
        };

        let method = request.method().to_string();
        let ctx = CallContext::new(method.clone()).with_peer_addr(peer_addr);

        // A panicking handler fails this call only.
        match tokio::spawn(request.dispatch(ctx)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Handler for {} panicked: {}", method, e);
                HandlerReply::err(format!("handler for {} panicked", method))
            }
        }
    }

    fn encode(&self, reply: &HandlerReply) -> Option<Bytes> {
        match self.codec.encode_response(reply.payload.as_ref(), &reply.error) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                tracing::error!("Failed to encode response: {}", e);
                let fallback = WrappedError::new(format!("failed to encode response: {}", e));
                let unit: &dyn EncodePayload = &();
                match self.codec.encode_response(unit, &fallback) {
                    Ok(encoded) => Some(encoded),
                    Err(e) => {
                        tracing::error!("Failed to encode error response: {}", e);
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PayloadFormat;
    use crate::error::RpcError;
    use crate::protocol::{read_response_frame, DEFAULT_MAX_PAYLOAD_SIZE};
    use crate::server::connection::Connection;
    use crate::server::queue::JobQueue;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct TestConnReq {
        message: String,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct TestConnRsp {
        client_ip: String,
        client_message: String,
    }

    fn registry() -> Arc<MethodRegistry> {
        let mut registry = MethodRegistry::new();
        registry
            .register("TestConn", |req: TestConnReq, ctx: CallContext| async move {
                Ok(TestConnRsp {
                    client_ip: ctx.peer_addr().map(|a| a.ip().to_string()).unwrap_or_default(),
                    client_message: req.message,
                })
            })
            .unwrap();
        registry
            .register("Fail", |_: (), _ctx: CallContext| async {
                Err::<(), _>(WrappedError::new("boom"))
            })
            .unwrap();
        registry
            .register("Panic", |_: (), _ctx: CallContext| async {
                if true {
                    panic!("handler bug");
                }
                Ok(())
            })
            .unwrap();
        registry
            .register("BadMap", |_: (), _ctx: CallContext| async {
                let mut map = HashMap::new();
                map.insert((1, 2), "tuple keys cannot be JSON");
                Ok(map)
            })
            .unwrap();
        Arc::new(registry)
    }

    /// Run one worker against one connection; return the client end.
    async fn setup() -> (TcpStream, Arc<Connection>, JobQueue) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (stream, peer) = accepted.unwrap();
        let (_reader, writer) = stream.into_split();
        let conn = Arc::new(Connection::new(1, peer, writer, None));

        let queue = JobQueue::new(8);
        let worker = Worker::new(
            0,
            queue.receiver(),
            registry(),
            WireCodec::default(),
            ShutdownController::new(),
        );
        tokio::spawn(worker.run());

        (client.unwrap(), conn, queue)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        client: &mut TcpStream,
        conn: &Arc<Connection>,
        queue: &JobQueue,
        frame: Bytes,
    ) -> crate::error::Result<T> {
        queue
            .sender()
            .unwrap()
            .push(Job::new(frame, conn.clone()))
            .await
            .unwrap();
        let rsp = read_response_frame(client, DEFAULT_MAX_PAYLOAD_SIZE).await?;
        WireCodec::default().decode_response::<T>(&rsp)?.into_result()
    }

    fn request<T: Serialize>(method: &str, value: &T) -> Bytes {
        WireCodec::new(PayloadFormat::Json)
            .encode_request(method, value)
            .unwrap()
    }

    #[tokio::test]
    async fn test_handler_response() {
        let (mut client, conn, queue) = setup().await;
        let frame = request(
            "TestConn",
            &TestConnReq {
                message: "Hello, server. Message 0".to_string(),
            },
        );

        let rsp: TestConnRsp = call(&mut client, &conn, &queue, frame).await.unwrap();
        assert_eq!(
            rsp,
            TestConnRsp {
                client_ip: "127.0.0.1".to_string(),
                client_message: "Hello, server. Message 0".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_business_error_response() {
        let (mut client, conn, queue) = setup().await;
        let err = call::<()>(&mut client, &conn, &queue, request("Fail", &()))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Business(ref e) if e.msg == "boom"));
    }

    #[tokio::test]
    async fn test_unknown_method_gets_error_response() {
        let (mut client, conn, queue) = setup().await;
        let err = call::<()>(&mut client, &conn, &queue, request("Nope", &()))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Business(ref e) if e.msg.contains("Nope")));
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_error_response() {
        let (mut client, conn, queue) = setup().await;
        let err = call::<()>(&mut client, &conn, &queue, Bytes::from_static(b"\x01\x00"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Business);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_kill_worker() {
        let (mut client, conn, queue) = setup().await;
        let err = call::<()>(&mut client, &conn, &queue, request("Panic", &()))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Business(ref e) if e.msg.contains("panicked")));

        let frame = request(
            "TestConn",
            &TestConnReq {
                message: "still alive".to_string(),
            },
        );
        let rsp: TestConnRsp = call(&mut client, &conn, &queue, frame).await.unwrap();
        assert_eq!(rsp.client_message, "still alive");
    }

    #[tokio::test]
    async fn test_unencodable_response_becomes_error() {
        let (mut client, conn, queue) = setup().await;
        let err = call::<()>(&mut client, &conn, &queue, request("BadMap", &()))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Business(ref e) if e.msg.contains("encode")));
    }
}
