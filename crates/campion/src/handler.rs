//! The resolution pipeline: blocklist first, then the authoritative
//! zone, then the forwarder.

use async_trait::async_trait;
use campion_filter::SharedBlocklist;
use campion_proto::{Class, Message, OpCode, ResourceRecord, ResponseCode};
use campion_resolver::{ForwardError, Forwarder};
use campion_server::{QueryContext, QueryHandler};
use campion_zone::{Lookup, SharedZone};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Answers queries from the live zone snapshot and forwards the rest,
/// with banned names redirected before either.
pub struct CampionHandler {
    zone: Arc<SharedZone>,
    banned: Arc<SharedBlocklist>,
    forwarder: Arc<Forwarder>,
}

impl CampionHandler {
    /// Creates the handler.
    pub fn new(
        zone: Arc<SharedZone>,
        banned: Arc<SharedBlocklist>,
        forwarder: Arc<Forwarder>,
    ) -> Self {
        Self {
            zone,
            banned,
            forwarder,
        }
    }

    /// The live zone.
    pub fn zone(&self) -> &SharedZone {
        &self.zone
    }
}

#[async_trait]
impl QueryHandler for CampionHandler {
    async fn handle(&self, query: Message, context: QueryContext) -> Message {
        let mut response = Message::response_from(&query);
        response.set_recursion_available(true);

        if query.opcode() != OpCode::Query {
            response.set_rcode(ResponseCode::NotImp);
            return response;
        }

        let Some(question) = query.question() else {
            response.set_rcode(ResponseCode::FormErr);
            return response;
        };

        if question.qclass != Class::IN && question.qclass != Class::ANY {
            response.set_rcode(ResponseCode::Refused);
            return response;
        }

        debug!(
            client = %context.client,
            protocol = %context.protocol,
            question = %question,
            "query"
        );

        // Banned names short-circuit everything, zone records included.
        let banned = self.banned.snapshot();
        if banned.matches(&question.qname) {
            info!(
                client = %context.client,
                name = %question.qname,
                redirect = %banned.redirect(),
                "banned"
            );
            response.add_answer(ResourceRecord::a(
                question.qname.clone(),
                banned.redirect(),
                banned.ttl(),
            ));
            return response;
        }

        // Each request resolves against one consistent snapshot; a
        // concurrent reload cannot tear it.
        let snapshot = self.zone.snapshot();
        match snapshot.resolve(&question.qname, question.qtype) {
            Lookup::Answered(records) => {
                response.set_authoritative(true);
                for record in records {
                    response.add_answer(record);
                }
            }
            Lookup::NameNotFound => {
                response.set_authoritative(true);
                response.set_rcode(ResponseCode::NXDomain);
            }
            Lookup::NotAuthoritative => match self.forwarder.forward(question).await {
                Ok(answer) => {
                    debug!(
                        question = %question,
                        cached = answer.cached,
                        records = answer.answers.len(),
                        "forwarded"
                    );
                    response.set_rcode(answer.rcode);
                    for record in answer.answers {
                        response.add_answer(record);
                    }
                    for record in answer.authorities {
                        response.add_authority(record);
                    }
                }
                Err(ForwardError::Refused { upstream }) => {
                    warn!(%upstream, question = %question, "upstream refused");
                    response.set_rcode(ResponseCode::Refused);
                }
                Err(error) => {
                    warn!(question = %question, %error, "forwarding failed");
                    response.set_rcode(ResponseCode::ServFail);
                }
            },
        }

        response
    }
}
