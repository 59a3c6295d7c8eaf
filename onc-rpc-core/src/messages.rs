//! ONC RPC call and reply messages ([RFC 5531, section 9]).
//!
//! The enums below rely on the XDR format encoding an enum variant as its
//! index, so variant order must follow the RFC discriminant values.
//!
//! [RFC 5531, section 9]: https://datatracker.ietf.org/doc/html/rfc5531#section-9

use serde::{Deserialize, Serialize};

use crate::xdr::Opaque;

pub const RPC_VERSION: u32 = 2;
/// Upper bound of an `opaque_auth` body.
pub const MAX_AUTH_BYTES: usize = 400;
/// Procedure 0 of every program takes and returns nothing.
pub const NULL_PROCEDURE: u32 = 0;

pub const AUTH_NONE: u32 = 0;
pub const AUTH_SYS: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct OpaqueAuth {
    pub flavor: u32,
    pub body: Opaque,
}

impl OpaqueAuth {
    pub fn none() -> Self {
        Self {
            flavor: AUTH_NONE,
            body: Opaque::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RpcMessage {
    pub xid: u32,
    pub body: MessageBody,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Call(CallBody),
    Reply(ReplyBody),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CallBody {
    pub rpc_version: u32,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
    pub cred: OpaqueAuth,
    pub verf: OpaqueAuth,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    Accepted(AcceptedReply),
    Denied(RejectedReply),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AcceptedReply {
    pub verf: OpaqueAuth,
    pub stat: AcceptStat,
}

/// Outcome of an accepted call. On `Success` the procedure results follow
/// the reply header in the same record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptStat {
    Success,
    ProgUnavail,
    ProgMismatch { low: u32, high: u32 },
    ProcUnavail,
    GarbageArgs,
    SystemErr,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedReply {
    RpcMismatch { low: u32, high: u32 },
    AuthError(AuthStat),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStat {
    Ok,
    BadCred,
    RejectedCred,
    BadVerf,
    RejectedVerf,
    TooWeak,
    InvalidResp,
    Failed,
}

impl RpcMessage {
    pub fn call(xid: u32, program: u32, version: u32, procedure: u32) -> Self {
        Self {
            xid,
            body: MessageBody::Call(CallBody {
                rpc_version: RPC_VERSION,
                program,
                version,
                procedure,
                cred: OpaqueAuth::none(),
                verf: OpaqueAuth::none(),
            }),
        }
    }

    pub fn accepted(xid: u32, stat: AcceptStat) -> Self {
        Self {
            xid,
            body: MessageBody::Reply(ReplyBody::Accepted(AcceptedReply {
                verf: OpaqueAuth::none(),
                stat,
            })),
        }
    }

    pub fn denied(xid: u32, reason: RejectedReply) -> Self {
        Self {
            xid,
            body: MessageBody::Reply(ReplyBody::Denied(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdr;

    #[test]
    fn call_header_layout() {
        let call = RpcMessage::call(0x0102_0304, 100_000, 4, 3);
        let bytes = xdr::to_bytes(&call).unwrap();
        #[rustfmt::skip]
        let expected: &[u8] = &[
            1, 2, 3, 4,         // xid
            0, 0, 0, 0,         // CALL
            0, 0, 0, 2,         // rpcvers
            0, 1, 0x86, 0xa0,   // prog 100000
            0, 0, 0, 4,         // vers
            0, 0, 0, 3,         // proc
            0, 0, 0, 0, 0, 0, 0, 0, // cred: AUTH_NONE, empty
            0, 0, 0, 0, 0, 0, 0, 0, // verf: AUTH_NONE, empty
        ];
        assert_eq!(&bytes[..], expected);
        assert_eq!(xdr::from_bytes::<RpcMessage>(expected).unwrap(), call);
    }

    #[test]
    fn accepted_reply_layout() {
        let reply = RpcMessage::accepted(7, AcceptStat::ProgMismatch { low: 1, high: 2 });
        let bytes = xdr::to_bytes(&reply).unwrap();
        #[rustfmt::skip]
        let expected: &[u8] = &[
            0, 0, 0, 7,         // xid
            0, 0, 0, 1,         // REPLY
            0, 0, 0, 0,         // MSG_ACCEPTED
            0, 0, 0, 0, 0, 0, 0, 0, // verf
            0, 0, 0, 2,         // PROG_MISMATCH
            0, 0, 0, 1,
            0, 0, 0, 2,
        ];
        assert_eq!(&bytes[..], expected);
    }

    #[test]
    fn denied_reply_layout() {
        let reply = RpcMessage::denied(9, RejectedReply::AuthError(AuthStat::TooWeak));
        let bytes = xdr::to_bytes(&reply).unwrap();
        assert_eq!(
            &bytes[..],
            &[0, 0, 0, 9, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 5]
        );
        assert_eq!(xdr::from_bytes::<RpcMessage>(&bytes).unwrap(), reply);
    }

    #[test]
    fn auth_sys_credentials_decode() {
        let mut call = RpcMessage::call(1, 2, 3, 4);
        if let MessageBody::Call(body) = &mut call.body {
            body.cred = OpaqueAuth {
                flavor: AUTH_SYS,
                body: Opaque(vec![0xde, 0xad, 0xbe, 0xef, 0x01]),
            };
        }
        let bytes = xdr::to_bytes(&call).unwrap();
        assert_eq!(xdr::from_bytes::<RpcMessage>(&bytes).unwrap(), call);
    }
}
