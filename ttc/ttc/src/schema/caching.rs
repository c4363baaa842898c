use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use ttc_parser::ast::{ClassDef, Dataset, FunctionDef, FunctionType, Input};
use ttc_parser::{Error, ErrorContext};

use super::{is_not_found, ClassFlags, SchemaRetriever};

/// Entries hold the final outcome of a fetch: a schema, or the cached
/// negative result for a name that does not exist. Transient failures
/// (timeouts, transport errors) are never stored.
type Slot<T> = Arc<OnceCell<Result<T, Error>>>;

/// A memoizing wrapper around another retriever.
///
/// Guarantees at-most-one outstanding fetch per key: concurrent callers
/// coalesce onto a single future. The cache is the only mutable state in the
/// toolchain and is shared across invocations; no locks are exposed to
/// consumers.
pub struct CachingSchemaRetriever<R> {
    inner: R,
    fetch_timeout: Duration,
    functions: Mutex<HashMap<(String, String, FunctionType), Slot<Arc<FunctionDef>>>>,
    classes: Mutex<HashMap<String, Slot<Arc<ClassDef>>>>,
}

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

impl<R> CachingSchemaRetriever<R> {
    pub fn new(inner: R) -> Self {
        Self::with_timeout(inner, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(inner: R, fetch_timeout: Duration) -> Self {
        CachingSchemaRetriever {
            inner,
            fetch_timeout,
            functions: Mutex::new(HashMap::new()),
            classes: Mutex::new(HashMap::new()),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: SchemaRetriever> CachingSchemaRetriever<R> {
    async fn fetch_through<K, T, F, Fut>(
        cache: &Mutex<HashMap<K, Slot<T>>>,
        key: K,
        fetch_timeout: Duration,
        fetch: F,
    ) -> Result<T, Error>
    where
        K: std::hash::Hash + Eq + Clone,
        T: Clone,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        let slot = {
            let mut cache = cache.lock().await;
            cache.entry(key).or_default().clone()
        };

        let outcome = slot
            .get_or_try_init(|| async {
                match tokio::time::timeout(fetch_timeout, fetch()).await {
                    // deadline exceeded: SchemaFetchTimeout, surfaced as
                    // UnresolvedSchema with the cause preserved, not cached
                    Err(_) => Err(Error::type_error(
                        ttc_parser::TypeErrorKind::UnresolvedSchema,
                        "schema fetch timed out",
                    )
                    .hint("SchemaFetchTimeout")),
                    Ok(Ok(value)) => Ok(Ok(value)),
                    // a missing name is a final answer and is cached
                    Ok(Err(e)) if is_not_found(&e) => Ok(Err(e)),
                    // other failures are transient; leave the slot empty
                    Ok(Err(e)) => Err(e),
                }
            })
            .await?;

        outcome.clone()
    }
}

impl<R: SchemaRetriever> SchemaRetriever for CachingSchemaRetriever<R> {
    async fn get_function(
        &self,
        kind: &str,
        name: &str,
        function_type: FunctionType,
    ) -> Result<Arc<FunctionDef>, Error> {
        Self::fetch_through(
            &self.functions,
            (kind.to_string(), name.to_string(), function_type),
            self.fetch_timeout,
            || self.inner.get_function(kind, name, function_type),
        )
        .await
    }

    async fn get_class(&self, kind: &str, flags: ClassFlags) -> Result<Arc<ClassDef>, Error> {
        Self::fetch_through(
            &self.classes,
            kind.to_string(),
            self.fetch_timeout,
            || self.inner.get_class(kind, flags),
        )
        .await
    }

    async fn get_examples_by_kinds(&self, kinds: &[String]) -> Result<Dataset, Error> {
        self.inner.get_examples_by_kinds(kinds).await
    }

    async fn inject_natural_language_annotations(&self, node: Input) -> Result<Input, Error> {
        self.inner.inject_natural_language_annotations(node).await
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingRetriever {
        calls: AtomicUsize,
    }

    impl SchemaRetriever for CountingRetriever {
        async fn get_function(
            &self,
            kind: &str,
            name: &str,
            function_type: FunctionType,
        ) -> Result<Arc<FunctionDef>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if kind == "com.missing" {
                return Err(super::super::not_found_error(
                    function_type.as_ref(),
                    &format!("{kind}.{name}"),
                ));
            }
            Ok(Arc::new(FunctionDef {
                kind: kind.to_string(),
                name: name.to_string(),
                function_type,
                args: vec![],
                is_list: false,
                is_monitorable: false,
                nl_annotations: Default::default(),
                annotations: Default::default(),
            }))
        }

        async fn get_class(&self, kind: &str, _flags: ClassFlags) -> Result<Arc<ClassDef>, Error> {
            Err(super::super::not_found_error("class", kind))
        }

        async fn get_examples_by_kinds(&self, _kinds: &[String]) -> Result<Dataset, Error> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_memoizes_positive_results() {
        let caching = CachingSchemaRetriever::new(CountingRetriever {
            calls: AtomicUsize::new(0),
        });

        let a = caching
            .get_function("com.twitter", "post", FunctionType::Action)
            .await
            .unwrap();
        let b = caching
            .get_function("com.twitter", "post", FunctionType::Action)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(caching.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memoizes_negative_results() {
        let caching = CachingSchemaRetriever::new(CountingRetriever {
            calls: AtomicUsize::new(0),
        });

        for _ in 0..3 {
            let err = caching
                .get_function("com.missing", "nope", FunctionType::Query)
                .await
                .unwrap_err();
            assert!(is_not_found(&err));
        }
        assert_eq!(caching.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_coalesce() {
        let caching = Arc::new(CachingSchemaRetriever::new(CountingRetriever {
            calls: AtomicUsize::new(0),
        }));

        let futures = (0..8).map(|_| {
            let caching = Arc::clone(&caching);
            async move {
                caching
                    .get_function("com.twitter", "post", FunctionType::Action)
                    .await
            }
        });
        let results = futures::future::join_all(futures).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(caching.inner.calls.load(Ordering::SeqCst), 1);
    }
}
