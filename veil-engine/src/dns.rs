//! Local DNS answering service
//!
//! A thin DNS front over the [`Resolver`], consumed by the packet engine to
//! answer hijacked UDP queries locally. Only A and AAAA questions get
//! answers; an A question is answered only when the resolver produced an
//! IPv4 address, an AAAA question only when it produced something else.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{RData, Record, RecordType};
use tracing::debug;

use crate::error::Result;
use crate::resolve::Resolver;
use crate::stack::LocalDnsServer;

/// Tunnel-aware DNS service
pub struct DnsService {
    resolver: Arc<Resolver>,
    /// The tunnel's own DNS servers; queries addressed to these are not
    /// hijacked
    local_dns: Vec<IpAddr>,
}

impl DnsService {
    pub fn new(resolver: Arc<Resolver>, local_dns: Vec<IpAddr>) -> Self {
        Self {
            resolver,
            local_dns,
        }
    }

    async fn answer_question(
        &self,
        reply: &mut Message,
        name: &hickory_proto::rr::Name,
        query_type: RecordType,
    ) {
        let host = name.to_utf8();
        let host = host.trim_end_matches('.');

        let resolution = match self.resolver.resolve(host).await {
            Ok(res) => res,
            Err(e) => {
                debug!(host, %e, "local DNS answer failed");
                return;
            }
        };

        let ttl = self.resolver.ttl().as_secs() as u32;
        match (query_type, resolution.ip) {
            (RecordType::A, IpAddr::V4(ip)) => {
                reply.add_answer(Record::from_rdata(name.clone(), ttl, RData::A(A(ip))));
            }
            (RecordType::AAAA, IpAddr::V6(ip)) => {
                reply.add_answer(Record::from_rdata(name.clone(), ttl, RData::AAAA(AAAA(ip))));
            }
            // Address family does not match the question; reply with an
            // empty answer section.
            _ => {}
        }
    }
}

#[async_trait]
impl LocalDnsServer for DnsService {
    async fn handle_dns_msg(&self, msg: &Message) -> Result<Message> {
        let mut reply = Message::new();
        reply
            .set_id(msg.id())
            .set_message_type(MessageType::Response)
            .set_op_code(msg.op_code())
            .set_recursion_desired(msg.recursion_desired())
            .set_recursion_available(true);

        for query in msg.queries() {
            reply.add_query(query.clone());
        }

        if msg.op_code() == OpCode::Query {
            for query in msg.queries().to_vec() {
                if matches!(query.query_type(), RecordType::A | RecordType::AAAA) {
                    self.answer_question(&mut reply, query.name(), query.query_type())
                        .await;
                }
            }
        }

        Ok(reply)
    }

    fn check_dns_hijack(&self, dst: Ipv4Addr) -> bool {
        !self.local_dns.contains(&IpAddr::V4(dst))
    }
}
