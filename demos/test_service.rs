//! The `TestConn` method shared by the demo server and client.

use carrier_rpc::Method;
use serde::{Deserialize, Serialize};

/// Demo server port.
pub const PORT: u16 = 2345;

#[derive(Serialize, Deserialize, Debug)]
pub struct TestConnReq {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TestConnRsp {
    pub client_ip: String,
    pub client_message: String,
}

pub struct TestConn;

impl Method for TestConn {
    const NAME: &'static str = "TestConn";
    type Request = TestConnReq;
    type Response = TestConnRsp;
}
