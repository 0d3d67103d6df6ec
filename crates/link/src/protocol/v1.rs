//! Protocol v1 dispatcher
//!
//! One [`V1Dispatcher`] is shared by every connection; per-connection state
//! (the registered identity and pinned version) lives on the connection task.
//!
//! ```text
//! loop:
//!   receive -> parse header            Eof: done, bad header: close
//!   not registered and not Register    -> InternalError, close
//!   registered and version changed     -> close
//!   execute                            -> Ok | InternalError, keep going
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use splitd_core::{
    Attributes, ClientIdentity, ClientTag, Evaluator, Event, Impression, now_millis,
};
use splitd_storage::{QueueError, TagFanIn};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::ProtocolError;
use super::args::{
    FromRpc, NoArgs, RegisterArgs, SplitArgs, TrackArgs, TreatmentArgs, TreatmentsArgs,
};
use super::envelope::{OpCode, PROTOCOL_V1, ResponseEnvelope, RpcEnvelope};
use super::payload::{
    ImpressionListenerData, ResponsePayload, SplitNamesPayload, SplitPayload, SplitViewPayload,
    SplitsPayload, TrackPayload, TreatmentPayload, TreatmentsPayload,
};
use crate::acceptor::ConnectionHandler;
use crate::codec::Codec;
use crate::socket::LocalStream;
use crate::transport::Transport;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Peer closed the socket between messages.
    PeerClosed,
    /// Registration or version rules were broken.
    ProtocolViolation,
    /// A message could not be decoded into an envelope.
    MalformedMessage,
    /// Socket error, deadline expiry or framing failure.
    TransportFailure,
}

type Response = ResponseEnvelope<ResponsePayload>;

enum Step {
    Reply(Response),
    ReplyAndClose(Response),
    Close,
}

#[derive(Debug, Default)]
struct Session {
    identity: Option<ClientIdentity>,
    version: u8,
}

/// Serves v1 RPCs against an evaluator and the impression/event fan-ins.
pub struct V1Dispatcher {
    evaluator: Arc<dyn Evaluator>,
    impressions: Arc<TagFanIn<ClientTag, Impression>>,
    events: Arc<TagFanIn<ClientTag, Event>>,
    codec: Codec,
}

impl V1Dispatcher {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        impressions: Arc<TagFanIn<ClientTag, Impression>>,
        events: Arc<TagFanIn<ClientTag, Event>>,
        codec: Codec,
    ) -> Self {
        Self {
            evaluator,
            impressions,
            events,
            codec,
        }
    }

    /// Run the request loop until the peer leaves or the protocol is broken.
    /// The transport is always shut down before returning.
    pub async fn serve<S>(&self, conn_id: u64, mut transport: Transport<S>) -> ConnectionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut session = Session::default();

        let outcome = loop {
            let rpc = match transport.receive_message().await {
                Ok(bytes) => match self.codec.parse::<RpcEnvelope>(bytes) {
                    Ok(rpc) => rpc,
                    Err(e) => {
                        warn!(conn_id, error = %e, "Undecodable RPC header, closing connection");
                        break ConnectionOutcome::MalformedMessage;
                    }
                },
                Err(e) if e.is_eof() => break ConnectionOutcome::PeerClosed,
                Err(e) => {
                    debug!(conn_id, error = %e, "Receive failed, closing connection");
                    break ConnectionOutcome::TransportFailure;
                }
            };

            let (response, close_after) = match self.dispatch(conn_id, &mut session, &rpc) {
                Step::Reply(response) => (response, false),
                Step::ReplyAndClose(response) => (response, true),
                Step::Close => break ConnectionOutcome::ProtocolViolation,
            };

            let sent = match self.codec.serialize(&response) {
                Ok(bytes) => transport.send_message(&bytes).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = sent {
                debug!(conn_id, error = %e, "Send failed, closing connection");
                break ConnectionOutcome::TransportFailure;
            }
            if close_after {
                break ConnectionOutcome::ProtocolViolation;
            }
        };

        if let Err(e) = transport.shutdown().await {
            debug!(conn_id, error = %e, "Transport shutdown failed");
        }
        outcome
    }

    fn dispatch(&self, conn_id: u64, session: &mut Session, rpc: &RpcEnvelope) -> Step {
        let violation = match session.identity {
            None if rpc.opcode != OpCode::Register.as_u8() => {
                let e = ProtocolError::NotRegistered { opcode: rpc.opcode };
                warn!(conn_id, error = %e, "Closing connection");
                return Step::ReplyAndClose(ResponseEnvelope::internal_error());
            }
            None if rpc.version != PROTOCOL_V1 => Some(ProtocolError::UnsupportedVersion(rpc.version)),
            Some(_) if rpc.version != session.version => Some(ProtocolError::VersionMismatch {
                registered: session.version,
                got: rpc.version,
            }),
            _ => None,
        };
        if let Some(e) = violation {
            warn!(conn_id, error = %e, "Closing connection");
            return Step::Close;
        }

        match self.execute(conn_id, session, rpc) {
            Ok(payload) => Step::Reply(ResponseEnvelope::ok(payload)),
            Err(e) => {
                warn!(conn_id, opcode = rpc.opcode, error = %e, "RPC failed");
                Step::Reply(ResponseEnvelope::internal_error())
            }
        }
    }

    fn execute(
        &self,
        conn_id: u64,
        session: &mut Session,
        rpc: &RpcEnvelope,
    ) -> Result<Option<ResponsePayload>, ProtocolError> {
        let opcode = OpCode::try_from(rpc.opcode)?;

        let Some(identity) = session.identity.as_ref() else {
            let args = RegisterArgs::from_rpc(rpc)?;
            info!(
                conn_id,
                client_id = %args.id,
                sdk_version = %args.sdk_version,
                flags = args.flags.bits(),
                "Client registered"
            );
            session.identity = Some(ClientIdentity::new(args.id, args.sdk_version, args.flags));
            session.version = rpc.version;
            return Ok(None);
        };

        let payload = match opcode {
            OpCode::Register => return Err(ProtocolError::AlreadyRegistered),
            OpCode::Treatment | OpCode::TreatmentWithConfig => {
                let args = TreatmentArgs::from_rpc(rpc)?;
                let mut results = self.evaluate_and_queue(
                    identity,
                    &args.key,
                    args.bucketing_key.as_deref(),
                    std::slice::from_ref(&args.feature),
                    args.attributes.as_ref(),
                    opcode == OpCode::TreatmentWithConfig,
                )?;
                match results.pop() {
                    Some(result) => ResponsePayload::Treatment(result),
                    None => return Err(splitd_core::Error::evaluation(args.feature, "no result").into()),
                }
            }
            OpCode::Treatments | OpCode::TreatmentsWithConfig => {
                let args = TreatmentsArgs::from_rpc(rpc)?;
                let results = self.evaluate_and_queue(
                    identity,
                    &args.key,
                    args.bucketing_key.as_deref(),
                    &args.features,
                    args.attributes.as_ref(),
                    opcode == OpCode::TreatmentsWithConfig,
                )?;
                ResponsePayload::Treatments(TreatmentsPayload { results })
            }
            OpCode::Track => {
                let args = TrackArgs::from_rpc(rpc)?;
                ResponsePayload::Track(TrackPayload {
                    success: self.queue_event(identity, args),
                })
            }
            OpCode::SplitNames => {
                NoArgs::from_rpc(rpc)?;
                ResponsePayload::SplitNames(SplitNamesPayload {
                    names: self.evaluator.split_names(),
                })
            }
            OpCode::Split => {
                let args = SplitArgs::from_rpc(rpc)?;
                ResponsePayload::Split(SplitPayload {
                    split: self.evaluator.split(&args.name).map(SplitViewPayload::from),
                })
            }
            OpCode::Splits => {
                NoArgs::from_rpc(rpc)?;
                ResponsePayload::Splits(SplitsPayload {
                    splits: self
                        .evaluator
                        .splits()
                        .into_iter()
                        .map(SplitViewPayload::from)
                        .collect(),
                })
            }
        };
        Ok(Some(payload))
    }

    /// Evaluate every feature, and only if all succeed queue one impression each.
    fn evaluate_and_queue(
        &self,
        identity: &ClientIdentity,
        key: &str,
        bucketing_key: Option<&str>,
        features: &[String],
        attributes: Option<&Attributes>,
        with_config: bool,
    ) -> Result<Vec<TreatmentPayload>, ProtocolError> {
        let now = now_millis();
        let mut payloads = Vec::with_capacity(features.len());
        let mut impressions = Vec::with_capacity(features.len());

        for feature in features {
            let result = self
                .evaluator
                .evaluate(key, bucketing_key, feature, attributes)?;

            payloads.push(TreatmentPayload {
                treatment: result.treatment.clone(),
                config: if with_config { result.config } else { None },
                listener: identity
                    .flags
                    .return_impression_data()
                    .then(|| ImpressionListenerData {
                        label: result.label.clone(),
                        time_ms: now,
                        change_number: result.change_number,
                    }),
            });
            impressions.push(Impression {
                key: key.to_string(),
                bucketing_key: bucketing_key.map(str::to_string),
                feature: feature.clone(),
                treatment: result.treatment,
                label: result.label,
                change_number: result.change_number,
                time: now,
            });
        }

        let tag = identity.tag();
        let offered = impressions.len();
        if let Err(QueueError::Full { pushed }) = self.impressions.push(&tag, impressions) {
            warn!(
                tag = %tag,
                dropped = offered - pushed,
                total_dropped = self.impressions.stats().dropped(),
                "Impression queue full, dropping impressions"
            );
        }
        Ok(payloads)
    }

    fn queue_event(&self, identity: &ClientIdentity, args: TrackArgs) -> bool {
        let event = Event {
            key: args.key,
            traffic_type: args.traffic_type,
            event_type: args.event_type,
            value: args.value,
            properties: args.properties,
            timestamp: args.timestamp,
        };
        let tag = identity.tag();
        match self.events.push(&tag, vec![event]) {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    tag = %tag,
                    error = %e,
                    total_dropped = self.events.stats().dropped(),
                    "Event queue full, dropping event"
                );
                false
            }
        }
    }
}

#[async_trait]
impl ConnectionHandler for V1Dispatcher {
    async fn handle(&self, conn_id: u64, transport: Transport<LocalStream>) {
        let outcome = self.serve(conn_id, transport).await;
        debug!(conn_id, ?outcome, "Connection finished");
    }
}
