//! Client side of the link: connects, registers and issues typed RPCs.

use std::path::PathBuf;

use ciborium::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;
use splitd_core::{Attributes, RegisterFlags};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::codec::Codec;
use crate::error::{CodecError, LinkError, LinkResult};
use crate::protocol::{
    OpCode, ResponseEnvelope, RpcEnvelope, SplitNamesPayload, SplitPayload, SplitViewPayload,
    SplitsPayload, TrackPayload, TreatmentPayload, TreatmentsPayload,
};
use crate::socket::{LocalStream, SocketFlavor};
use crate::transport::{Transport, TransportOptions};

/// Where and how to reach the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub path: PathBuf,
    pub flavor: SocketFlavor,
    pub codec: Codec,
    pub transport: TransportOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from(crate::acceptor::DEFAULT_SOCKET_PATH),
            flavor: SocketFlavor::default(),
            codec: Codec::default(),
            transport: TransportOptions::default(),
        }
    }
}

/// A registered connection to the daemon.
#[derive(Debug)]
pub struct LinkClient<S = LocalStream> {
    transport: Transport<S>,
    codec: Codec,
}

impl LinkClient<LocalStream> {
    /// Connect over the configured socket and register.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] when the socket cannot be reached, or any
    /// error from [`LinkClient::register`].
    pub async fn connect(
        options: &ClientOptions,
        id: &str,
        sdk_version: &str,
        flags: RegisterFlags,
    ) -> LinkResult<Self> {
        let stream = LocalStream::connect(options.flavor, &options.path)
            .await
            .map_err(|e| LinkError::io(format!("failed to connect to {}", options.path.display()), e))?;
        let transport = Transport::new(stream, options.flavor.framer(), options.transport);
        let mut client = Self::new(transport, options.codec);
        client.register(id, sdk_version, flags).await?;
        Ok(client)
    }
}

impl<S> LinkClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected transport. Call [`LinkClient::register`] next.
    #[must_use]
    pub const fn new(transport: Transport<S>, codec: Codec) -> Self {
        Self { transport, codec }
    }

    /// # Errors
    ///
    /// Returns [`LinkError::Remote`] when the daemon refuses the registration.
    pub async fn register(
        &mut self,
        id: &str,
        sdk_version: &str,
        flags: RegisterFlags,
    ) -> LinkResult<()> {
        self.call_raw(
            OpCode::Register,
            vec![text(id), text(sdk_version), Value::Integer(flags.bits().into())],
        )
        .await?;
        debug!(client_id = id, sdk_version, "Registered with daemon");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns transport, codec or [`LinkError::Remote`] errors.
    pub async fn treatment(
        &mut self,
        key: &str,
        bucketing_key: Option<&str>,
        feature: &str,
        attributes: Option<&Attributes>,
    ) -> LinkResult<TreatmentPayload> {
        let args = treatment_args(key, bucketing_key, text(feature), attributes)?;
        self.call(OpCode::Treatment, args).await
    }

    /// # Errors
    ///
    /// Returns transport, codec or [`LinkError::Remote`] errors.
    pub async fn treatment_with_config(
        &mut self,
        key: &str,
        bucketing_key: Option<&str>,
        feature: &str,
        attributes: Option<&Attributes>,
    ) -> LinkResult<TreatmentPayload> {
        let args = treatment_args(key, bucketing_key, text(feature), attributes)?;
        self.call(OpCode::TreatmentWithConfig, args).await
    }

    /// # Errors
    ///
    /// Returns transport, codec or [`LinkError::Remote`] errors.
    pub async fn treatments(
        &mut self,
        key: &str,
        bucketing_key: Option<&str>,
        features: &[String],
        attributes: Option<&Attributes>,
    ) -> LinkResult<Vec<TreatmentPayload>> {
        let args = treatment_args(key, bucketing_key, text_list(features), attributes)?;
        let payload: TreatmentsPayload = self.call(OpCode::Treatments, args).await?;
        Ok(payload.results)
    }

    /// # Errors
    ///
    /// Returns transport, codec or [`LinkError::Remote`] errors.
    pub async fn treatments_with_config(
        &mut self,
        key: &str,
        bucketing_key: Option<&str>,
        features: &[String],
        attributes: Option<&Attributes>,
    ) -> LinkResult<Vec<TreatmentPayload>> {
        let args = treatment_args(key, bucketing_key, text_list(features), attributes)?;
        let payload: TreatmentsPayload = self.call(OpCode::TreatmentsWithConfig, args).await?;
        Ok(payload.results)
    }

    /// Queue an event. Returns whether the daemon accepted it.
    ///
    /// # Errors
    ///
    /// Returns transport, codec or [`LinkError::Remote`] errors.
    pub async fn track(
        &mut self,
        key: &str,
        traffic_type: &str,
        event_type: &str,
        value: Option<f64>,
        properties: Option<&Attributes>,
        timestamp: i64,
    ) -> LinkResult<bool> {
        let args = vec![
            text(key),
            text(traffic_type),
            text(event_type),
            value.map_or(Value::Null, Value::Float),
            optional_value(properties)?,
            Value::Integer(timestamp.into()),
        ];
        let payload: TrackPayload = self.call(OpCode::Track, args).await?;
        Ok(payload.success)
    }

    /// # Errors
    ///
    /// Returns transport, codec or [`LinkError::Remote`] errors.
    pub async fn split_names(&mut self) -> LinkResult<Vec<String>> {
        let payload: SplitNamesPayload = self.call(OpCode::SplitNames, Vec::new()).await?;
        Ok(payload.names)
    }

    /// # Errors
    ///
    /// Returns transport, codec or [`LinkError::Remote`] errors.
    pub async fn split(&mut self, name: &str) -> LinkResult<Option<SplitViewPayload>> {
        let payload: SplitPayload = self.call(OpCode::Split, vec![text(name)]).await?;
        Ok(payload.split)
    }

    /// # Errors
    ///
    /// Returns transport, codec or [`LinkError::Remote`] errors.
    pub async fn splits(&mut self) -> LinkResult<Vec<SplitViewPayload>> {
        let payload: SplitsPayload = self.call(OpCode::Splits, Vec::new()).await?;
        Ok(payload.splits)
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns the socket shutdown error.
    pub async fn close(mut self) -> LinkResult<()> {
        self.transport.shutdown().await
    }

    async fn call<P: DeserializeOwned>(&mut self, opcode: OpCode, args: Vec<Value>) -> LinkResult<P> {
        let payload = self.call_raw(opcode, args).await?;
        payload
            .deserialized()
            .map_err(|e| CodecError::parse(format!("{} payload: {e}", opcode.name())).into())
    }

    async fn call_raw(&mut self, opcode: OpCode, args: Vec<Value>) -> LinkResult<Value> {
        let request = self.codec.serialize(&RpcEnvelope::new(opcode, args))?;
        self.transport.send_message(&request).await?;

        let bytes = self.transport.receive_message().await?;
        let response: ResponseEnvelope = self.codec.parse(bytes)?;
        if !response.is_ok() {
            return Err(LinkError::Remote {
                status: response.status,
            });
        }
        Ok(response.payload.unwrap_or(Value::Null))
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn text_list(items: &[String]) -> Value {
    Value::Array(items.iter().map(|s| text(s)).collect())
}

fn optional_value<T: Serialize>(value: Option<&T>) -> Result<Value, CodecError> {
    value.map_or(Ok(Value::Null), |v| {
        Value::serialized(v).map_err(|e| CodecError::serialization(e.to_string()))
    })
}

fn treatment_args(
    key: &str,
    bucketing_key: Option<&str>,
    features: Value,
    attributes: Option<&Attributes>,
) -> Result<Vec<Value>, CodecError> {
    Ok(vec![
        text(key),
        bucketing_key.map_or(Value::Null, text),
        features,
        optional_value(attributes)?,
    ])
}
