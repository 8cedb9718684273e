//! Message-passing boundary exposing `removeObject` to a host application
//!
//! A host transport delivers a [`MethodCall`] and receives exactly one
//! [`MethodResponse`]. Every failure collapses to `status = 0` with a message;
//! the error taxonomy only shows up in logs.

use crate::{
    api::ObjectRemover,
    config::OutputFormat,
    error::{ErrorKind, InpaintError, Result},
    services::{DEFAULT_IMAGE_ARGUMENT, MASKED_IMAGE_ARGUMENT},
    types::NormalizedRegion,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Name of the only supported method
pub const REMOVE_OBJECT_METHOD: &str = "removeObject";

/// Optional argument holding a `{x, y, width, height}` map of fractions
pub const REGION_ARGUMENT: &str = "region";

pub const SUCCESS_MESSAGE: &str = "Success";
pub const INVALID_ARGUMENTS_MESSAGE: &str = "Invalid arguments!";
pub const DECODE_FAILURE_MESSAGE: &str = "Unable to process image";
pub const PROCESSING_FAILURE_MESSAGE: &str = "Unable to object removing";
pub const MODEL_UNAVAILABLE_MESSAGE: &str = "Object removal model is unavailable";
pub const CANCELLED_MESSAGE: &str = "Request cancelled";

/// Dynamically typed argument value carried by the host transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ArgumentValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Map(HashMap<String, ArgumentValue>),
}

impl ArgumentValue {
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Numeric value of an `Int` or `Float`
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<Vec<u8>> for ArgumentValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<NormalizedRegion> for ArgumentValue {
    fn from(region: NormalizedRegion) -> Self {
        let map = [
            ("x", region.x),
            ("y", region.y),
            ("width", region.width),
            ("height", region.height),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), Self::Float(f64::from(value))))
        .collect();
        Self::Map(map)
    }
}

/// Incoming method invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: HashMap<String, ArgumentValue>,
}

impl MethodCall {
    pub fn new<S: Into<String>>(method: S) -> Self {
        Self {
            method: method.into(),
            arguments: HashMap::new(),
        }
    }

    /// `removeObject` call with both image buffers
    #[must_use]
    pub fn remove_object(default_image: Vec<u8>, masked_image: Vec<u8>) -> Self {
        Self::new(REMOVE_OBJECT_METHOD)
            .with_argument(DEFAULT_IMAGE_ARGUMENT, default_image)
            .with_argument(MASKED_IMAGE_ARGUMENT, masked_image)
    }

    #[must_use]
    pub fn with_argument<S: Into<String>, V: Into<ArgumentValue>>(mut self, name: S, value: V) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_region(self, region: NormalizedRegion) -> Self {
        self.with_argument(REGION_ARGUMENT, region)
    }
}

/// Result of a `removeObject` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveObjectResponse {
    /// 1 on success, 0 on failure
    pub status: u8,
    pub message: String,
    /// PNG bytes, present only on success
    #[serde(rename = "imageBytes", default, skip_serializing_if = "Option::is_none")]
    pub image_bytes: Option<Vec<u8>>,
}

impl RemoveObjectResponse {
    #[must_use]
    pub fn success(image_bytes: Vec<u8>) -> Self {
        Self {
            status: 1,
            message: SUCCESS_MESSAGE.to_string(),
            image_bytes: Some(image_bytes),
        }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self {
            status: 0,
            message: message.into(),
            image_bytes: None,
        }
    }

    /// Failure response for an error, logging its taxonomy
    #[must_use]
    pub fn from_error(error: &InpaintError) -> Self {
        let kind = error.kind();
        log::error!("❌ {REMOVE_OBJECT_METHOD} failed [{kind}]: {error}");
        Self::failure(Self::message_for(kind))
    }

    /// Caller-facing message for an error kind
    #[must_use]
    pub fn message_for(kind: ErrorKind) -> &'static str {
        match kind {
            ErrorKind::InvalidArguments => INVALID_ARGUMENTS_MESSAGE,
            ErrorKind::DecodeError => DECODE_FAILURE_MESSAGE,
            ErrorKind::ModelUnavailable => MODEL_UNAVAILABLE_MESSAGE,
            ErrorKind::Cancelled => CANCELLED_MESSAGE,
            ErrorKind::InferenceError
            | ErrorKind::CropError
            | ErrorKind::CompositionError
            | ErrorKind::Configuration
            | ErrorKind::Internal => PROCESSING_FAILURE_MESSAGE,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == 1
    }
}

/// Terminal value delivered for one method call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MethodResponse {
    /// The method ran; the payload carries success or failure
    Completed(RemoveObjectResponse),
    /// The method name is not recognized
    NotImplemented,
}

/// Handler for calls arriving from a host transport
#[async_trait]
pub trait MethodCallHandler: Send + Sync {
    /// Handle one call and produce its single response
    async fn handle(&self, call: MethodCall, cancel: CancellationToken) -> MethodResponse;
}

/// `removeObject` plugin bound to an [`ObjectRemover`]
#[derive(Debug, Clone)]
pub struct ObjectRemoverPlugin {
    remover: ObjectRemover,
}

impl ObjectRemoverPlugin {
    #[must_use]
    pub fn new(remover: ObjectRemover) -> Self {
        Self { remover }
    }

    #[must_use]
    pub fn remover(&self) -> &ObjectRemover {
        &self.remover
    }

    /// Run `removeObject` with the given arguments
    pub async fn remove_object(
        &self,
        arguments: &HashMap<String, ArgumentValue>,
        cancel: &CancellationToken,
    ) -> RemoveObjectResponse {
        match self.try_remove_object(arguments, cancel).await {
            Ok(bytes) => RemoveObjectResponse::success(bytes),
            Err(error) => RemoveObjectResponse::from_error(&error),
        }
    }

    async fn try_remove_object(
        &self,
        arguments: &HashMap<String, ArgumentValue>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let source = Self::bytes_argument(arguments, DEFAULT_IMAGE_ARGUMENT)?;
        let mask = Self::bytes_argument(arguments, MASKED_IMAGE_ARGUMENT)?;
        let region = Self::region_argument(arguments)?;

        let output = self
            .remover
            .remove_object(source, mask, region, cancel)
            .await?;
        output.to_bytes(OutputFormat::Png)
    }

    /// Spawn the call and return a receiver for its single response
    ///
    /// A call whose token is cancelled never delivers a response; the receiver
    /// then observes a closed channel.
    pub fn dispatch(
        self: &Arc<Self>,
        call: MethodCall,
        cancel: CancellationToken,
    ) -> oneshot::Receiver<MethodResponse> {
        let (sender, receiver) = oneshot::channel();
        let plugin = Arc::clone(self);
        tokio::spawn(async move {
            let response = plugin.handle(call, cancel.clone()).await;
            if cancel.is_cancelled() {
                log::debug!("Dropping response of a cancelled call");
                return;
            }
            // The caller may have dropped the receiver
            let _ = sender.send(response);
        });
        receiver
    }

    fn bytes_argument<'a>(
        arguments: &'a HashMap<String, ArgumentValue>,
        name: &str,
    ) -> Result<Option<&'a [u8]>> {
        match arguments.get(name) {
            None | Some(ArgumentValue::Null) => Ok(None),
            Some(value) => value.as_bytes().map(Some).ok_or_else(|| {
                InpaintError::invalid_arguments(format!("{name} must be a byte buffer"))
            }),
        }
    }

    fn region_argument(arguments: &HashMap<String, ArgumentValue>) -> Result<NormalizedRegion> {
        let map = match arguments.get(REGION_ARGUMENT) {
            None | Some(ArgumentValue::Null) => return Ok(NormalizedRegion::FULL),
            Some(ArgumentValue::Map(map)) => map,
            Some(_) => {
                return Err(InpaintError::invalid_arguments(
                    "region must be a map of x, y, width and height",
                ))
            },
        };

        let component = |name: &str| -> Result<f32> {
            map.get(name)
                .and_then(ArgumentValue::as_f64)
                .map(|value| value as f32)
                .ok_or_else(|| {
                    InpaintError::invalid_arguments(format!("region.{name} must be a number"))
                })
        };

        NormalizedRegion::new(
            component("x")?,
            component("y")?,
            component("width")?,
            component("height")?,
        )
    }
}

#[async_trait]
impl MethodCallHandler for ObjectRemoverPlugin {
    async fn handle(&self, call: MethodCall, cancel: CancellationToken) -> MethodResponse {
        if call.method != REMOVE_OBJECT_METHOD {
            log::warn!("Unknown method '{}'", call.method);
            return MethodResponse::NotImplemented;
        }
        MethodResponse::Completed(self.remove_object(&call.arguments, &cancel).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockInpaintingBackend;
    use crate::config::InpaintConfig;
    use crate::session::ModelHandle;
    use image::{DynamicImage, GenericImageView};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn plugin(backend: MockInpaintingBackend) -> ObjectRemoverPlugin {
        ObjectRemoverPlugin::new(ObjectRemover::with_model_handle(Arc::new(
            ModelHandle::from_backend(Box::new(backend), InpaintConfig::default()),
        )))
    }

    fn completed(response: MethodResponse) -> RemoveObjectResponse {
        match response {
            MethodResponse::Completed(response) => response,
            MethodResponse::NotImplemented => panic!("expected a completed call"),
        }
    }

    #[tokio::test]
    async fn test_successful_call() {
        let plugin = plugin(MockInpaintingBackend::new(16));
        let call = MethodCall::remove_object(png(20, 10), png(20, 10));

        let response = completed(plugin.handle(call, CancellationToken::new()).await);
        assert!(response.is_success());
        assert_eq!(response.message, "Success");

        let image = image::load_from_memory(&response.image_bytes.unwrap()).unwrap();
        assert_eq!(image.dimensions(), (20, 10));
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let plugin = plugin(MockInpaintingBackend::new(16));
        let call = MethodCall::new(REMOVE_OBJECT_METHOD).with_argument(DEFAULT_IMAGE_ARGUMENT, png(4, 4));

        let response = completed(plugin.handle(call, CancellationToken::new()).await);
        assert_eq!(response.status, 0);
        assert_eq!(response.message, "Invalid arguments!");
        assert!(response.image_bytes.is_none());
    }

    #[tokio::test]
    async fn test_wrongly_typed_argument() {
        let plugin = plugin(MockInpaintingBackend::new(16));
        let call = MethodCall::new(REMOVE_OBJECT_METHOD)
            .with_argument(DEFAULT_IMAGE_ARGUMENT, ArgumentValue::String("png".into()))
            .with_argument(MASKED_IMAGE_ARGUMENT, png(4, 4));

        let response = completed(plugin.handle(call, CancellationToken::new()).await);
        assert_eq!(response.message, INVALID_ARGUMENTS_MESSAGE);
    }

    #[tokio::test]
    async fn test_malformed_default_image() {
        let plugin = plugin(MockInpaintingBackend::new(16));
        let call = MethodCall::remove_object(b"\x89PNG broken".to_vec(), png(4, 4));

        let response = completed(plugin.handle(call, CancellationToken::new()).await);
        assert_eq!(response.status, 0);
        assert_eq!(response.message, "Unable to process image");
    }

    #[tokio::test]
    async fn test_inference_failure_message() {
        let plugin = plugin(MockInpaintingBackend::new_failing_inference(16));
        let call = MethodCall::remove_object(png(8, 8), png(8, 8));

        let response = completed(plugin.handle(call, CancellationToken::new()).await);
        assert_eq!(response.message, "Unable to object removing");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let plugin = plugin(MockInpaintingBackend::new(16));
        let response = plugin
            .handle(MethodCall::new("getPlatformVersion"), CancellationToken::new())
            .await;
        assert_eq!(response, MethodResponse::NotImplemented);
    }

    #[tokio::test]
    async fn test_region_argument() {
        let plugin = plugin(MockInpaintingBackend::new(16));
        let region = NormalizedRegion::new(0.25, 0.25, 0.5, 0.5).unwrap();
        let call = MethodCall::remove_object(png(16, 16), png(16, 16)).with_region(region);
        assert!(completed(plugin.handle(call, CancellationToken::new()).await).is_success());

        let mut bad = HashMap::new();
        bad.insert("x".to_string(), ArgumentValue::Float(0.5));
        let call = MethodCall::remove_object(png(16, 16), png(16, 16))
            .with_argument(REGION_ARGUMENT, ArgumentValue::Map(bad));
        let response = completed(plugin.handle(call, CancellationToken::new()).await);
        assert_eq!(response.message, INVALID_ARGUMENTS_MESSAGE);
    }

    #[tokio::test]
    async fn test_dispatch_delivers_one_response() {
        let plugin = Arc::new(plugin(MockInpaintingBackend::new(8)));
        let receiver = plugin.dispatch(
            MethodCall::remove_object(png(8, 8), png(8, 8)),
            CancellationToken::new(),
        );
        let response = completed(receiver.await.unwrap());
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_dispatch_cancelled_call_is_never_delivered() {
        let plugin = Arc::new(plugin(MockInpaintingBackend::new(8)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let receiver = plugin.dispatch(MethodCall::remove_object(png(8, 8), png(8, 8)), cancel);
        assert!(receiver.await.is_err());
    }

    #[test]
    fn test_message_mapping() {
        assert_eq!(
            RemoveObjectResponse::message_for(ErrorKind::CropError),
            PROCESSING_FAILURE_MESSAGE
        );
        assert_eq!(
            RemoveObjectResponse::message_for(ErrorKind::ModelUnavailable),
            MODEL_UNAVAILABLE_MESSAGE
        );
    }

    #[test]
    fn test_response_json_shape() {
        let json = serde_json::to_value(MethodResponse::Completed(RemoveObjectResponse::success(
            vec![1, 2, 3],
        )))
        .unwrap();
        assert_eq!(json["kind"], "completed");
        assert_eq!(json["status"], 1);
        assert_eq!(json["imageBytes"], serde_json::json!([1, 2, 3]));

        let json = serde_json::to_value(RemoveObjectResponse::failure("Invalid arguments!")).unwrap();
        assert!(json.get("imageBytes").is_none());

        let json = serde_json::to_value(MethodResponse::NotImplemented).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "notImplemented" }));
    }

    #[test]
    fn test_method_call_json() {
        let call: MethodCall = serde_json::from_str(
            r#"{ "method": "removeObject", "arguments": { "defaultImage": { "type": "bytes", "value": [1, 2] } } }"#,
        )
        .unwrap();
        assert_eq!(
            call.arguments.get(DEFAULT_IMAGE_ARGUMENT).and_then(ArgumentValue::as_bytes),
            Some(&[1u8, 2][..])
        );
    }
}
