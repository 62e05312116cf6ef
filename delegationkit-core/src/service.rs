//! The signed-request surface of the remote service.
//!
//! This crate does not know what the service does with a call; it only signs
//! calls on behalf of the delegator and checks that answers are authentic.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    delegation::{unix_nanos_now, DelegatedIdentity, SignedRequest},
    error::DelegationKitError,
    identity::Principal,
    lifecycle::CancelSignal,
    trust::{CertifiedResponse, TrustPolicy},
};

/// Operations exposed by the remote game service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceMethod {
    /// Starts a new game session.
    CreateSession,
    /// Fetches the next unit of work.
    NextRound,
    /// Submits the result of a round.
    SubmitResult,
    /// Buys an optional hint.
    PurchaseHint,
    /// Finalizes and scores the session.
    FinalizeSession,
}

/// A call as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCall {
    /// The operation invoked.
    pub method: ServiceMethod,
    /// Encoded arguments.
    #[serde(with = "hex")]
    pub args: Vec<u8>,
    /// Hex principal the call is made on behalf of.
    pub sender: String,
    /// Signature and delegation chain authenticating the call.
    pub request: SignedRequest,
}

impl SignedCall {
    /// The bytes covered by `request.signature`: `method || 0x00 || args`.
    #[must_use]
    pub fn signed_message(method: ServiceMethod, args: &[u8]) -> Vec<u8> {
        let name: &'static str = method.into();
        let mut message = Vec::with_capacity(name.len() + 1 + args.len());
        message.extend_from_slice(name.as_bytes());
        message.push(0);
        message.extend_from_slice(args);
        message
    }
}

/// Transport to the remote service, provided by the host.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Sends `call` and returns the certified answer.
    ///
    /// # Errors
    ///
    /// Returns the service's textual error.
    async fn call(&self, call: SignedCall) -> Result<CertifiedResponse, String>;
}

/// Signs calls with a [`DelegatedIdentity`] and checks answers against a
/// [`TrustPolicy`].
#[derive(Clone)]
pub struct ServiceClient {
    identity: DelegatedIdentity,
    service: Arc<dyn RemoteService>,
    policy: TrustPolicy,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("principal", &self.identity.principal())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    /// Creates a client.
    #[must_use]
    pub fn new(
        identity: DelegatedIdentity,
        service: Arc<dyn RemoteService>,
        policy: TrustPolicy,
    ) -> Self {
        Self {
            identity,
            service,
            policy,
        }
    }

    /// The principal calls are made on behalf of.
    #[must_use]
    pub fn principal(&self) -> Principal {
        self.identity.principal()
    }

    /// Invokes `method` with raw `args` and returns the verified response body.
    ///
    /// The in-flight call is abandoned as soon as `signal` fires.
    ///
    /// # Errors
    ///
    /// - [`DelegationKitError::Cancelled`] if `signal` fired.
    /// - [`DelegationKitError::DelegationExpired`] if the delegation has expired.
    /// - [`DelegationKitError::RemoteRejected`] for a textual service error.
    /// - [`DelegationKitError::UntrustedResponse`] if the answer fails the trust policy.
    pub async fn call(
        &self,
        method: ServiceMethod,
        args: &[u8],
        signal: &CancelSignal,
    ) -> Result<Vec<u8>, DelegationKitError> {
        signal.check()?;
        if self.identity.is_expired(unix_nanos_now()?) {
            return Err(DelegationKitError::DelegationExpired);
        }

        let call = SignedCall {
            method,
            args: args.to_vec(),
            sender: self.identity.principal().to_string(),
            request: self
                .identity
                .sign(&SignedCall::signed_message(method, args)),
        };
        log::debug!("calling {method} as {}", call.sender);

        let response = signal
            .guard(self.service.call(call))
            .await?
            .map_err(DelegationKitError::RemoteRejected)?;
        self.policy.check(&response)?;
        Ok(response.body)
    }

    /// Like [`Self::call`] with JSON-encoded arguments and result.
    ///
    /// # Errors
    ///
    /// As [`Self::call`], plus [`DelegationKitError::SerializationError`].
    pub async fn call_json<A, R>(
        &self,
        method: ServiceMethod,
        args: &A,
        signal: &CancelSignal,
    ) -> Result<R, DelegationKitError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        let args = serde_json::to_vec(args)?;
        let body = self.call(method, &args, signal).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ed25519_dalek::{Signature, Verifier, VerifyingKey};
    use serde_json::json;

    use super::*;
    use crate::{
        delegation::tests::sample_chain,
        identity::{ed25519_raw, SessionIdentity},
        lifecycle::PendingOperation,
        storage::Namespace,
        trust::tests::{certify, root, verifier},
    };

    #[derive(Default)]
    struct FakeService {
        calls: Mutex<Vec<SignedCall>>,
        reply: Mutex<Option<Result<CertifiedResponse, String>>>,
    }

    impl FakeService {
        fn replying(reply: Result<CertifiedResponse, String>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::default(),
                reply: Mutex::new(Some(reply)),
            })
        }
    }

    #[async_trait]
    impl RemoteService for FakeService {
        async fn call(&self, call: SignedCall) -> Result<CertifiedResponse, String> {
            self.calls.lock().unwrap().push(call);
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err("no reply scripted".to_string()))
        }
    }

    fn certified(body: &[u8]) -> CertifiedResponse {
        CertifiedResponse {
            body: body.to_vec(),
            certificate: certify(&root(), body),
        }
    }

    fn client(service: Arc<FakeService>, expiration: u64) -> ServiceClient {
        let session = SessionIdentity::generate(Namespace::default()).unwrap();
        let chain = sample_chain(&session.public_key_der(), expiration);
        let identity = DelegatedIdentity::new(session, chain).unwrap();
        ServiceClient::new(identity, service, TrustPolicy::verified(verifier()))
    }

    #[tokio::test]
    async fn test_call_is_signed_and_verified() {
        let service = FakeService::replying(Ok(certified(b"{\"round\":3}")));
        let client = client(service.clone(), u64::MAX);

        let reply: serde_json::Value = client
            .call_json(ServiceMethod::NextRound, &json!({"session": 1}), &CancelSignal::new())
            .await
            .unwrap();
        assert_eq!(reply, json!({"round": 3}));

        let calls = service.calls.lock().unwrap();
        let call = &calls[0];
        assert_eq!(call.method, ServiceMethod::NextRound);
        assert_eq!(call.sender, client.principal().to_string());

        let key = VerifyingKey::from_bytes(&ed25519_raw(&call.request.sender_public_key).unwrap())
            .unwrap();
        let mut message = crate::delegation::REQUEST_DOMAIN.to_vec();
        message.extend_from_slice(&SignedCall::signed_message(call.method, &call.args));
        let signature = Signature::from_slice(&call.request.signature).unwrap();
        assert!(key.verify(&message, &signature).is_ok());
    }

    #[tokio::test]
    async fn test_textual_error_is_remote_rejected() {
        let service = FakeService::replying(Err("round already submitted".to_string()));
        let client = client(service, u64::MAX);

        let err = client
            .call(ServiceMethod::SubmitResult, b"{}", &CancelSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DelegationKitError::RemoteRejected(msg) if msg == "round already submitted"));
    }

    #[tokio::test]
    async fn test_uncertified_answer_is_untrusted() {
        let mut response = certified(b"ok");
        response.body = b"tampered".to_vec();
        let client = client(FakeService::replying(Ok(response)), u64::MAX);

        let err = client
            .call(ServiceMethod::PurchaseHint, b"{}", &CancelSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DelegationKitError::UntrustedResponse(_)));
    }

    #[tokio::test]
    async fn test_expired_delegation_is_not_sent() {
        let service = FakeService::replying(Ok(certified(b"ok")));
        let client = client(service.clone(), 1);

        let err = client
            .call(ServiceMethod::CreateSession, b"{}", &CancelSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DelegationKitError::DelegationExpired));
        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_call_never_reaches_the_service() {
        let service = FakeService::replying(Ok(certified(b"ok")));
        let client = client(service.clone(), u64::MAX);
        let op = PendingOperation::new();
        let handle = op.cancel_handle();

        let client = &client;
        let outcome = op
            .run(|signal| async move {
                handle.cancel();
                client.call(ServiceMethod::FinalizeSession, b"{}", &signal).await
            })
            .await;

        assert!(outcome.is_cancelled());
        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_method_names_are_snake_case() {
        assert_eq!(ServiceMethod::PurchaseHint.to_string(), "purchase_hint");
        assert_eq!(
            "finalize_session".parse::<ServiceMethod>().unwrap(),
            ServiceMethod::FinalizeSession
        );
    }
}
