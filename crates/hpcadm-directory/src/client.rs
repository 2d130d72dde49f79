//! Directory client with RFC 2696 paged search and attribute modification.

use crate::{config::DirectoryConfig, entry::DirectoryEntry, Result};
use async_trait::async_trait;
use hpcadm_core::Error;
use ldap3::controls::{Control, ControlType, MakeCritical, PagedResults};
use ldap3::{LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::time::timeout;
use tracing::warn;

/// Default page size for paged searches.
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

/// Search scope for directory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Parameters of one logical search. Constructed per call, not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Base DN the search starts from.
    pub base_dn: String,
    /// Search scope.
    pub scope: SearchScope,
    /// LDAP filter expression.
    pub filter: String,
    /// Attributes to return.
    pub attributes: Vec<String>,
    /// Requested page size for the paged-results control.
    pub page_size: i32,
}

impl SearchRequest {
    /// Creates a subtree search with the default page size.
    #[must_use]
    pub fn new(base_dn: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope: SearchScope::Subtree,
            filter: filter.into(),
            attributes: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the search scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the attribute list to request.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Single attribute modification. Applied individually; no batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes the attribute).
        values: Vec<String>,
    },
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

impl DirectoryModification {
    /// Shorthand for a single-value replace.
    #[must_use]
    pub fn replace(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Replace {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    /// Shorthand for a single-value add.
    #[must_use]
    pub fn add(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Add {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    /// Shorthand for a single-value delete.
    #[must_use]
    pub fn delete(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Delete {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }
}

/// Continuation state reported by the server after one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// More results; reissue with this cookie.
    More(Vec<u8>),
    /// Final page.
    Done,
    /// The server did not return the paged-results control.
    Unsupported,
}

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    /// Entries in server return order.
    pub entries: Vec<DirectoryEntry>,
    /// Continuation state.
    pub paging: PageState,
}

/// Complete result of a paged search.
#[derive(Debug, Clone)]
pub struct PagedSearchOutcome {
    /// All entries, pages concatenated in server order.
    pub entries: Vec<DirectoryEntry>,
    /// Number of pages fetched.
    pub pages: usize,
    /// True when the server ignored the RFC 2696 control and only the
    /// first page was returned.
    pub server_ignored_paging: bool,
}

/// A paged search that failed part-way through.
///
/// Carries the entries gathered before the failure so the caller can
/// decide whether partial results are usable.
#[derive(Debug, ThisError)]
#[error("{error}")]
pub struct PagedSearchError {
    /// The underlying directory error.
    pub error: Error,
    /// Entries collected before the failure.
    pub partial: Vec<DirectoryEntry>,
    /// Pages fetched before the failure.
    pub pages: usize,
}

impl From<PagedSearchError> for Error {
    fn from(err: PagedSearchError) -> Self {
        err.error
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search_page(&mut self, request: &SearchRequest, cookie: &[u8]) -> Result<SearchPage>;
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Directory client with a pluggable LDAP backend.
pub struct DirectoryClient {
    config: Arc<DirectoryConfig>,
    connector: Box<dyn LdapConnector>,
}

impl DirectoryClient {
    /// Creates a client that uses the real LDAP connector.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(config.clone()));
        Self { config, connector }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_connector(config: DirectoryConfig, connector: Box<dyn LdapConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    /// Executes a search, transparently paging through all results.
    ///
    /// Pages are concatenated in server return order; the result is
    /// equivalent to a single unpaged search of the same filter. When the
    /// server does not return the paged-results control the first page is
    /// returned alone and `server_ignored_paging` is set.
    ///
    /// # Errors
    ///
    /// A directory failure mid-search is returned as
    /// [`PagedSearchError`], carrying the entries gathered so far.
    pub async fn paged_search(
        &self,
        request: &SearchRequest,
    ) -> std::result::Result<PagedSearchOutcome, PagedSearchError> {
        let mut session = self.session().await.map_err(|error| PagedSearchError {
            error,
            partial: Vec::new(),
            pages: 0,
        })?;

        let mut entries = Vec::new();
        let mut pages = 0;
        let mut server_ignored_paging = false;
        let mut cookie: Vec<u8> = Vec::new();

        loop {
            match session.search_page(request, &cookie).await {
                Ok(page) => {
                    pages += 1;
                    entries.extend(page.entries);
                    match page.paging {
                        PageState::More(next) => cookie = next,
                        PageState::Done => break,
                        PageState::Unsupported => {
                            warn!(
                                base_dn = request.base_dn.as_str(),
                                "server ignores the RFC 2696 paged-results control"
                            );
                            server_ignored_paging = true;
                            break;
                        }
                    }
                }
                Err(error) => {
                    let _ = session.unbind().await;
                    return Err(PagedSearchError {
                        error,
                        partial: entries,
                        pages,
                    });
                }
            }
        }

        // All pages are in hand; a failed unbind only leaks the
        // connection and must not discard the result.
        if let Err(error) = session.unbind().await {
            warn!(%error, "directory unbind failed after completed search");
        }

        Ok(PagedSearchOutcome {
            entries,
            pages,
            server_ignored_paging,
        })
    }

    /// Executes a paged search and returns the entries, discarding paging
    /// metadata and any partial results on failure.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>> {
        Ok(self.paged_search(request).await?.entries)
    }

    /// Executes a search that must match exactly one entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for zero matches and
    /// [`Error::IntegrityError`] for more than one, so a unique lookup can
    /// never silently act on the wrong record.
    pub async fn search_one(&self, request: &SearchRequest) -> Result<DirectoryEntry> {
        let mut entries = self.search(request).await?;
        match entries.len() {
            0 => Err(Error::NotFound(format!(
                "no directory entry matches `{}` under {}",
                request.filter, request.base_dn
            ))),
            1 => Ok(entries.remove(0)),
            n => Err(Error::IntegrityError(format!(
                "{n} directory entries match `{}` under {}, expected exactly one",
                request.filter, request.base_dn
            ))),
        }
    }

    /// Applies modifications to the entry identified by `dn`.
    ///
    /// Modifications are applied in the given order and never reordered;
    /// directory errors propagate with no rollback.
    pub async fn modify(&self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mut session = self.session().await?;
        session.modify(dn, modifications).await?;
        session.unbind().await?;
        Ok(())
    }

    async fn session(&self) -> Result<Box<dyn LdapSession>> {
        let mut session = self.connector.connect().await?;
        if let Some((dn, password)) = self.config.credentials() {
            session.simple_bind(dn, password).await?;
        }
        Ok(session)
    }
}

/// Real LDAP connector backed by `ldap3`.
struct RealLdapConnector {
    config: Arc<DirectoryConfig>,
}

impl RealLdapConnector {
    fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.config)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.config.url())
            .await
            .map_err(map_ldap_error)?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = timeout(self.operation_timeout, self.inner.simple_bind(dn, password))
            .await
            .map_err(|_| Error::Timeout("directory bind timed out".to_string()))?
            .map_err(map_ldap_error)?;
        ensure_ldap_success(result)
    }

    async fn search_page(&mut self, request: &SearchRequest, cookie: &[u8]) -> Result<SearchPage> {
        let control = PagedResults {
            size: request.page_size,
            cookie: cookie.to_vec(),
        };
        let result = timeout(
            self.operation_timeout,
            self.inner.with_controls(control.critical()).search(
                &request.base_dn,
                request.scope.into(),
                &request.filter,
                request.attributes.clone(),
            ),
        )
        .await
        .map_err(|_| Error::Timeout("directory search timed out".to_string()))?
        .map_err(map_ldap_error)?;

        let (entries, ldap_result) = result.success().map_err(map_ldap_error)?;

        let mut paging = PageState::Unsupported;
        for Control(control_type, raw) in &ldap_result.ctrls {
            if matches!(control_type, Some(ControlType::PagedResults)) {
                let response: PagedResults = raw.parse();
                paging = if response.cookie.is_empty() {
                    PageState::Done
                } else {
                    PageState::More(response.cookie)
                };
            }
        }

        Ok(SearchPage {
            entries: entries
                .into_iter()
                .map(SearchEntry::construct)
                .map(|entry| DirectoryEntry {
                    dn: entry.dn,
                    attributes: entry.attrs,
                })
                .collect(),
            paging,
        })
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|modification| match modification {
                DirectoryModification::Add { attribute, values } => Mod::Add(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
                DirectoryModification::Delete { attribute, values } => Mod::Delete(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
                DirectoryModification::Replace { attribute, values } => Mod::Replace(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
            })
            .collect::<Vec<_>>();

        let result = timeout(self.operation_timeout, self.inner.modify(dn, mods))
            .await
            .map_err(|_| Error::Timeout("directory modify timed out".to_string()))?
            .map_err(map_ldap_error)?;
        ensure_ldap_success(result)
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::Timeout("directory unbind timed out".to_string()))?
            .map_err(map_ldap_error)?;
        Ok(())
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(config.connection_timeout())
        .set_starttls(config.starttls());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid directory CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    Error::DirectoryError(err.to_string())
}

fn ensure_ldap_success(result: ldap3::LdapResult) -> Result<()> {
    result.success().map_err(map_ldap_error).map(|_| ())
}

/// Escapes a value for embedding in an LDAP filter expression.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> DirectoryConfig {
        DirectoryConfig::new("ldap://directory.cluster.example.edu").with_simple_bind(
            "cn=maintenance,dc=cluster,dc=example,dc=edu",
            secrecy::SecretString::from("secret".to_string()),
        )
    }

    fn entry(uid: &str) -> DirectoryEntry {
        let mut attributes = HashMap::new();
        attributes.insert("uid".to_string(), vec![uid.to_string()]);
        DirectoryEntry {
            dn: format!("uid={uid},ou=People,dc=cluster,dc=example,dc=edu"),
            attributes,
        }
    }

    fn request() -> SearchRequest {
        SearchRequest::new(
            "ou=People,dc=cluster,dc=example,dc=edu",
            "objectClass=posixAccount",
        )
        .with_scope(SearchScope::OneLevel)
        .with_attributes(["uid"])
        .with_page_size(2)
    }

    fn session_with_pages(pages: Vec<Result<SearchPage>>) -> MockLdapSession {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| Ok(()));
        let mut pages = pages.into_iter();
        session
            .expect_search_page()
            .returning(move |_, _| pages.next().expect("unexpected extra page request"));
        session.expect_unbind().returning(|| Ok(()));
        session
    }

    fn client_with_session(session: MockLdapSession) -> DirectoryClient {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .return_once(move || Ok(Box::new(session)));
        DirectoryClient::with_connector(test_config(), Box::new(connector))
    }

    #[tokio::test]
    async fn concatenates_pages_in_server_order() {
        let session = session_with_pages(vec![
            Ok(SearchPage {
                entries: vec![entry("alice"), entry("bob")],
                paging: PageState::More(b"cookie-1".to_vec()),
            }),
            Ok(SearchPage {
                entries: vec![entry("carol"), entry("dave")],
                paging: PageState::More(b"cookie-2".to_vec()),
            }),
            Ok(SearchPage {
                entries: vec![entry("erin")],
                paging: PageState::Done,
            }),
        ]);

        let client = client_with_session(session);
        let outcome = client.paged_search(&request()).await.unwrap();

        assert_eq!(outcome.pages, 3);
        assert!(!outcome.server_ignored_paging);
        let uids: Vec<_> = outcome
            .entries
            .iter()
            .map(|e| e.first("uid").unwrap().to_string())
            .collect();
        assert_eq!(uids, vec!["alice", "bob", "carol", "dave", "erin"]);
    }

    #[tokio::test]
    async fn continuation_cookie_is_reissued() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| Ok(()));
        let mut call = 0;
        session.expect_search_page().returning(move |_, cookie| {
            call += 1;
            match call {
                1 => {
                    assert!(cookie.is_empty());
                    Ok(SearchPage {
                        entries: vec![entry("alice")],
                        paging: PageState::More(b"next".to_vec()),
                    })
                }
                _ => {
                    assert_eq!(cookie, b"next");
                    Ok(SearchPage {
                        entries: vec![entry("bob")],
                        paging: PageState::Done,
                    })
                }
            }
        });
        session.expect_unbind().returning(|| Ok(()));

        let client = client_with_session(session);
        let outcome = client.paged_search(&request()).await.unwrap();
        assert_eq!(outcome.entries.len(), 2);
    }

    #[tokio::test]
    async fn noncompliant_server_yields_single_page_with_warning_flag() {
        let session = session_with_pages(vec![Ok(SearchPage {
            entries: vec![entry("alice")],
            paging: PageState::Unsupported,
        })]);

        let client = client_with_session(session);
        let outcome = client.paged_search(&request()).await.unwrap();
        assert_eq!(outcome.pages, 1);
        assert!(outcome.server_ignored_paging);
        assert_eq!(outcome.entries.len(), 1);
    }

    #[tokio::test]
    async fn mid_search_failure_surfaces_partial_results() {
        let session = session_with_pages(vec![
            Ok(SearchPage {
                entries: vec![entry("alice"), entry("bob")],
                paging: PageState::More(b"cookie".to_vec()),
            }),
            Err(Error::DirectoryError("size limit exceeded".to_string())),
        ]);

        let client = client_with_session(session);
        let err = client.paged_search(&request()).await.unwrap_err();
        assert!(matches!(err.error, Error::DirectoryError(_)));
        assert_eq!(err.pages, 1);
        assert_eq!(err.partial.len(), 2);
    }

    #[tokio::test]
    async fn unbind_failure_after_final_page_does_not_discard_results() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| Ok(()));
        session.expect_search_page().returning(|_, _| {
            Ok(SearchPage {
                entries: vec![entry("alice"), entry("bob")],
                paging: PageState::Done,
            })
        });
        session
            .expect_unbind()
            .returning(|| Err(Error::DirectoryError("connection reset".to_string())));

        let client = client_with_session(session);
        let outcome = client.paged_search(&request()).await.unwrap();
        assert_eq!(outcome.pages, 1);
        assert_eq!(outcome.entries.len(), 2);
    }

    #[tokio::test]
    async fn search_one_rejects_multiple_matches() {
        let session = session_with_pages(vec![Ok(SearchPage {
            entries: vec![entry("alice"), entry("alice2")],
            paging: PageState::Done,
        })]);

        let client = client_with_session(session);
        let err = client.search_one(&request()).await.unwrap_err();
        assert!(matches!(err, Error::IntegrityError(_)));
    }

    #[tokio::test]
    async fn search_one_not_found_for_empty_result() {
        let session = session_with_pages(vec![Ok(SearchPage {
            entries: Vec::new(),
            paging: PageState::Done,
        })]);

        let client = client_with_session(session);
        let err = client.search_one(&request()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn modify_passes_modifications_in_caller_order() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| Ok(()));
        session
            .expect_modify()
            .withf(|dn, modifications| {
                dn == "uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu"
                    && modifications
                        == [
                            DirectoryModification::replace("gidNumber", "6000"),
                            DirectoryModification::add(
                                "uniqueMember",
                                "uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu",
                            ),
                        ]
            })
            .returning(|_, _| Ok(()));
        session.expect_unbind().returning(|| Ok(()));

        let client = client_with_session(session);
        client
            .modify(
                "uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu",
                &[
                    DirectoryModification::replace("gidNumber", "6000"),
                    DirectoryModification::add(
                        "uniqueMember",
                        "uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu",
                    ),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bind_failure_aborts_before_search() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .returning(|_, _| Err(Error::DirectoryError("invalid credentials".to_string())));

        let client = client_with_session(session);
        let err = client.paged_search(&request()).await.unwrap_err();
        assert!(err.partial.is_empty());
        assert!(matches!(err.error, Error::DirectoryError(_)));
    }

    #[test]
    fn filter_escaping() {
        assert_eq!(escape_filter_value("jdoe"), "jdoe");
        assert_eq!(escape_filter_value("a*(b)\\"), "a\\2a\\28b\\29\\5c");
    }
}
