//! Emulated document store for exercising access policies end to end.
//!
//! A [`TestEnvironment`] owns an in-memory store and an evaluator. Contexts
//! obtained from it act as a particular caller: every `set`, `update`, `get`
//! and `delete` is checked against the policies first and only touches the
//! store when allowed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rideshear_core::CoreConfig;
use rideshear_rules::{
    rideshare, ContextBuilder, DenyReason, DocumentPath, Evaluator, Fields, InMemoryStore,
    OperationKind, PolicyTable, Principal, RawRequest, RuleError, WriteMode, DENIED_MESSAGE,
};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{}", DENIED_MESSAGE)]
    PermissionDenied(DenyReason),
    #[error("no document at {0}")]
    NotFound(DocumentPath),
    #[error(transparent)]
    Rules(#[from] RuleError),
}

impl HarnessError {
    pub fn is_denied(&self) -> bool {
        matches!(self, HarnessError::PermissionDenied(_))
    }

    pub fn reason(&self) -> Option<&DenyReason> {
        match self {
            HarnessError::PermissionDenied(reason) => Some(reason),
            _ => None,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Shared store plus the policies guarding it.
#[derive(Clone)]
pub struct TestEnvironment {
    store: InMemoryStore,
    evaluator: Evaluator,
    timeout: Duration,
}

impl TestEnvironment {
    /// Environment guarded by the built-in ride-share policies.
    pub fn new() -> Result<Self, RuleError> {
        Ok(Self::with_table(rideshare::policy_table()?))
    }

    pub fn with_table(table: PolicyTable) -> Self {
        Self {
            store: InMemoryStore::new(),
            evaluator: Evaluator::new(table),
            timeout: CoreConfig::default().eval_timeout,
        }
    }

    /// Loads policies from `policy_path` when configured.
    pub fn from_config(config: &CoreConfig) -> Result<Self, RuleError> {
        let table = match &config.policy_path {
            Some(path) => PolicyTable::from_path(path)?,
            None => rideshare::policy_table()?,
        };
        let mut env = Self::with_table(table);
        env.timeout = config.eval_timeout;
        Ok(env)
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn authenticated_context(&self, uid: &str, claims: Option<Fields>) -> TestContext {
        let principal = Principal::authenticated(uid).with_claims(claims.unwrap_or_default());
        self.context(principal, true)
    }

    pub fn unauthenticated_context(&self) -> TestContext {
        self.context(Principal::anonymous(), true)
    }

    /// Runs `setup` with a context whose operations skip policy checks.
    pub async fn with_security_rules_disabled<F, Fut, T>(&self, setup: F) -> T
    where
        F: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = T>,
    {
        setup(self.context(Principal::anonymous(), false)).await
    }

    /// Removes every stored document.
    pub fn clear(&self) {
        self.store.clear();
    }

    fn context(&self, principal: Principal, enforce: bool) -> TestContext {
        TestContext {
            env: self.clone(),
            principal,
            enforce,
        }
    }
}

/// A caller's view of the store.
#[derive(Clone)]
pub struct TestContext {
    env: TestEnvironment,
    principal: Principal,
    enforce: bool,
}

impl TestContext {
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn collection(&self, name: &str) -> CollectionRef {
        CollectionRef {
            ctx: self.clone(),
            path: name.trim_matches('/').to_string(),
        }
    }

    /// Reference to a document by full path.
    pub fn doc(&self, path: &str) -> Result<DocumentRef, RuleError> {
        Ok(DocumentRef {
            ctx: self.clone(),
            path: DocumentPath::parse(path)?,
        })
    }

    async fn perform(
        &self,
        kind: OperationKind,
        path: &DocumentPath,
        payload: Option<Fields>,
        mode: WriteMode,
    ) -> HarnessResult<Option<Fields>> {
        let store = &self.env.store;
        let snapshot = store.snapshot();
        let existing = snapshot.get(path).map(|document| document.fields);
        if kind == OperationKind::Update && existing.is_none() {
            return Err(HarnessError::NotFound(path.clone()));
        }

        let mut request =
            RawRequest::new(kind, path.to_string(), self.principal.clone()).mode(mode);
        request.existing = existing;
        request.payload = payload;
        let request = request.upsert();
        let kind = request.operation;

        let ctx = ContextBuilder::new(Arc::new(snapshot)).build(request)?;
        if self.enforce {
            let decision = self.env.evaluator.evaluate_within(&ctx, self.env.timeout).await?;
            if let Some(reason) = decision.reason() {
                debug!(path = %path, operation = %kind, reason = %reason, "operation rejected");
                return Err(HarnessError::PermissionDenied(reason.clone()));
            }
        }

        match kind {
            OperationKind::Create | OperationKind::Update => {
                let fields = ctx.proposed().map(|doc| doc.fields.clone()).unwrap_or_default();
                store.put(path.clone(), fields);
                Ok(None)
            }
            OperationKind::Read => Ok(ctx.existing().map(|doc| doc.fields.clone())),
            OperationKind::Delete => {
                store.delete(path);
                Ok(None)
            }
        }
    }
}

#[derive(Clone)]
pub struct CollectionRef {
    ctx: TestContext,
    path: String,
}

impl CollectionRef {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn doc(&self, id: &str) -> Result<DocumentRef, RuleError> {
        self.ctx.doc(&format!("{}/{}", self.path, id))
    }

    /// Reference with a freshly generated id.
    pub fn new_doc(&self) -> Result<DocumentRef, RuleError> {
        self.doc(&Uuid::new_v4().simple().to_string())
    }
}

#[derive(Clone)]
pub struct DocumentRef {
    ctx: TestContext,
    path: DocumentPath,
}

impl DocumentRef {
    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn collection(&self, name: &str) -> CollectionRef {
        CollectionRef {
            ctx: self.ctx.clone(),
            path: format!("{}/{}", self.path, name.trim_matches('/')),
        }
    }

    /// Creates the document, or replaces it wholesale when it already exists.
    pub async fn set(&self, fields: Fields) -> HarnessResult<()> {
        self.ctx
            .perform(OperationKind::Create, &self.path, Some(fields), WriteMode::Replace)
            .await
            .map(|_| ())
    }

    /// Merges `fields` into an existing document.
    pub async fn update(&self, fields: Fields) -> HarnessResult<()> {
        self.ctx
            .perform(OperationKind::Update, &self.path, Some(fields), WriteMode::Merge)
            .await
            .map(|_| ())
    }

    pub async fn get(&self) -> HarnessResult<Option<Fields>> {
        self.ctx
            .perform(OperationKind::Read, &self.path, None, WriteMode::default())
            .await
    }

    pub async fn delete(&self) -> HarnessResult<()> {
        self.ctx
            .perform(OperationKind::Delete, &self.path, None, WriteMode::default())
            .await
            .map(|_| ())
    }
}

/// Awaits `operation` and panics unless it was permitted.
pub async fn assert_succeeds<T, F>(operation: F) -> T
where
    F: Future<Output = HarnessResult<T>>,
{
    match operation.await {
        Ok(value) => value,
        Err(err) => panic!("expected operation to succeed, got: {err} ({err:?})"),
    }
}

/// Awaits `operation` and panics unless it was rejected by policy.
pub async fn assert_fails<T, F>(operation: F) -> HarnessError
where
    F: Future<Output = HarnessResult<T>>,
{
    match operation.await {
        Ok(_) => panic!("expected operation to be denied, but it succeeded"),
        Err(err) if err.is_denied() => err,
        Err(err) => panic!("expected a denial, got: {err} ({err:?})"),
    }
}
