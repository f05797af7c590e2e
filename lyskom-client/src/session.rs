//! High-level session API.
//!
//! A [`Session`] wraps a [`Client`] with the per-session state that depends
//! on who is logged in: the entity caches, the membership caches and the
//! coordinator that keeps them consistent with the server.

use crate::cache::{CacheStats, Caches};
use crate::client::Client;
use crate::connection::ConnectionConfig;
use crate::coordinator::CacheCoordinator;
use crate::dispatch::HandlerTable;
use crate::error::ClientError;
use crate::membership::MembershipState;
use crate::unread;
use lyskom_protocol::{
    AsyncKind, AuxItemInput, ConfNo, ConfZInfo, Conference, DynamicSessionInfo, ErrorCode,
    Hollerith, LocalTextNo, Membership, MiscInfo, PersNo, Person, Request, SessionNo, TextMapping,
    TextNo, TextStat, Time, UConference, VersionInfo,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// End position passed to `get-text` to fetch the whole body.
const WHOLE_TEXT: u32 = i32::MAX as u32;

/// A LysKOM session.
pub struct Session {
    client: Client,
    caches: Arc<Caches>,
    memberships: Arc<MembershipState>,
    coordinator: Option<Arc<CacheCoordinator>>,
    accepted: Mutex<BTreeSet<AsyncKind>>,
}

impl Session {
    /// Creates a session. With `caching` on, a cache coordinator is added to
    /// `handlers` and caches are switched on as soon as the server accepts
    /// the async messages they depend on.
    pub fn new(config: ConnectionConfig, mut handlers: HandlerTable, caching: bool) -> Self {
        let caches = Arc::new(Caches::new());
        let memberships = Arc::new(MembershipState::new());
        let coordinator = caching.then(|| {
            let coordinator = Arc::new(CacheCoordinator::new(caches.clone(), memberships.clone()));
            coordinator.register(&mut handlers);
            coordinator
        });

        Self {
            client: Client::new(config, handlers),
            caches,
            memberships,
            coordinator,
            accepted: Mutex::new(BTreeSet::new()),
        }
    }

    /// Connects to the configured server and subscribes to every kind a
    /// handler is registered for.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        self.reset();
        self.client.connect().await?;
        self.subscribe_handlers().await
    }

    /// Like [`connect`](Self::connect), over an established stream.
    pub async fn connect_with<S>(&self, stream: S) -> Result<(), ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        self.reset();
        self.client.connect_with(stream).await?;
        self.subscribe_handlers().await
    }

    /// Drops everything learned on a previous connection.
    fn reset(&self) {
        self.accepted.lock().clear();
        self.caches.disable_all();
        self.caches.clear();
        self.memberships.set_enabled(false);
        self.memberships.set_person(None);
    }

    async fn subscribe_handlers(&self) -> Result<(), ClientError> {
        let kinds = self.client.handlers().kinds();
        if kinds.is_empty() {
            return Ok(());
        }
        self.subscribe(kinds).await
    }

    /// Asks the server to send `kinds` in addition to the kinds already
    /// accepted, then enables every cache that is now fully covered.
    pub async fn subscribe(
        &self,
        kinds: impl IntoIterator<Item = AsyncKind>,
    ) -> Result<(), ClientError> {
        let mut wanted = self.accepted.lock().clone();
        wanted.extend(kinds);
        let numbers: Vec<u32> = wanted.iter().map(|kind| kind.number()).collect();

        self.client
            .request_as::<()>(Request::accept_async(&numbers))
            .await?;
        tracing::debug!("Accepted async messages: {:?}", numbers);

        *self.accepted.lock() = wanted.clone();
        if let Some(coordinator) = &self.coordinator {
            coordinator.mark_subscribed(&wanted);
        }
        Ok(())
    }

    /// Kinds the server has agreed to send.
    pub fn accepted(&self) -> BTreeSet<AsyncKind> {
        self.accepted.lock().clone()
    }

    pub async fn close(&self) -> Result<(), ClientError> {
        self.reset();
        self.client.close().await
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// The underlying request client, for calls without a helper here.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    pub fn memberships(&self) -> &MembershipState {
        &self.memberships
    }

    pub fn cache_stats(&self) -> Vec<(&'static str, CacheStats)> {
        let mut stats = self.caches.stats();
        stats.push(("membership", self.memberships.stats()));
        stats
    }

    fn logged_in_person(&self) -> Result<PersNo, ClientError> {
        self.memberships.person().ok_or(ClientError::NotLoggedIn)
    }

    // ---------------------------------------------------------------------
    // Login state
    // ---------------------------------------------------------------------

    pub async fn login(
        &self,
        person: PersNo,
        password: &str,
        invisible: bool,
    ) -> Result<(), ClientError> {
        self.client
            .request_as::<()>(Request::login(person, Hollerith::from_latin1(password), invisible))
            .await?;
        self.memberships.set_person(Some(person));
        tracing::info!("Logged in as person {}", person);
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.client.request_as::<()>(Request::logout()).await?;
        self.memberships.set_person(None);
        Ok(())
    }

    pub async fn who_am_i(&self) -> Result<SessionNo, ClientError> {
        self.client.request_as(Request::who_am_i()).await
    }

    pub async fn change_conference(&self, conf: ConfNo) -> Result<(), ClientError> {
        self.client
            .request_as::<()>(Request::change_conference(conf))
            .await?;
        self.memberships.set_current_conference(conf);
        Ok(())
    }

    pub async fn user_active(&self) -> Result<(), ClientError> {
        self.client.request_as(Request::user_active()).await
    }

    // ---------------------------------------------------------------------
    // Cached entities
    // ---------------------------------------------------------------------

    pub async fn conference(&self, conf: ConfNo) -> Result<Conference, ClientError> {
        self.caches.conferences.get(&self.client, conf).await
    }

    pub async fn uconference(&self, conf: ConfNo) -> Result<UConference, ClientError> {
        self.caches.uconferences.get(&self.client, conf).await
    }

    pub async fn person(&self, person: PersNo) -> Result<Person, ClientError> {
        self.caches.persons.get(&self.client, person).await
    }

    pub async fn text_stat(&self, text: TextNo) -> Result<TextStat, ClientError> {
        self.caches.text_stats.get(&self.client, text).await
    }

    /// Fetches the full body of `text`. Bodies are not cached.
    pub async fn get_text(&self, text: TextNo) -> Result<Hollerith, ClientError> {
        self.client
            .request_as(Request::get_text(text, 0, WHOLE_TEXT))
            .await
    }

    // ---------------------------------------------------------------------
    // Memberships and reading
    // ---------------------------------------------------------------------

    /// The logged-in person's membership in `conf`, with all read ranges.
    pub async fn membership(&self, conf: ConfNo) -> Result<Membership, ClientError> {
        let person = self.logged_in_person()?;
        let client = &self.client;
        self.memberships
            .by_conference()
            .get_with(conf, move || {
                client.request_as::<Membership>(Request::query_read_texts(person, conf, true, 0))
            })
            .await
    }

    /// The membership at `position` in the logged-in person's list.
    pub async fn membership_at(&self, position: u32) -> Result<Membership, ClientError> {
        let person = self.logged_in_person()?;
        if let Some(membership) = self.memberships.at_position(position) {
            return Ok(membership);
        }

        let generation = self.memberships.position_generation();
        let list: Vec<Membership> = self
            .client
            .request_as(Request::get_membership(person, position, 1, true, 0))
            .await?;
        let membership = list.into_iter().next().ok_or(ClientError::Server {
            code: ErrorCode::IndexOutOfRange,
            detail: position,
        })?;
        self.memberships
            .store_position(membership.clone(), generation);
        Ok(membership)
    }

    /// Conferences where the logged-in person may have unread texts.
    pub async fn unread_conferences(&self) -> Result<Vec<ConfNo>, ClientError> {
        let person = self.logged_in_person()?;
        self.client
            .request_as(Request::get_unread_confs(person))
            .await
    }

    /// Global numbers of the texts `membership` has not read.
    pub async fn resolve_unread(
        &self,
        membership: &Membership,
    ) -> Result<Vec<TextNo>, ClientError> {
        let conf = membership.conference;
        let client = &self.client;
        unread::resolve_unread(membership, move |first, count| {
            client.request_as::<TextMapping>(Request::local_to_global(conf, first, count))
        })
        .await
    }

    pub async fn mark_as_read(
        &self,
        conf: ConfNo,
        local_texts: &[LocalTextNo],
    ) -> Result<(), ClientError> {
        self.client
            .request_as::<()>(Request::mark_as_read(conf, local_texts))
            .await?;
        self.memberships.invalidate(conf);
        Ok(())
    }

    pub async fn set_last_read(
        &self,
        conf: ConfNo,
        last_read: LocalTextNo,
    ) -> Result<(), ClientError> {
        self.client
            .request_as::<()>(Request::set_last_read(conf, last_read))
            .await?;
        self.memberships.invalidate(conf);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Writing and messaging
    // ---------------------------------------------------------------------

    pub async fn create_text(
        &self,
        body: &str,
        misc_info: Vec<MiscInfo>,
        aux_items: Vec<AuxItemInput>,
    ) -> Result<TextNo, ClientError> {
        let text_no = self
            .client
            .request_as(Request::create_text(
                Hollerith::from_latin1(body),
                misc_info,
                aux_items,
            ))
            .await?;
        tracing::debug!("Created text {}", text_no);
        Ok(text_no)
    }

    /// Sends `message` to a conference or person, or to everyone when
    /// `recipient` is 0.
    pub async fn send_message(&self, recipient: ConfNo, message: &str) -> Result<(), ClientError> {
        self.client
            .request_as(Request::send_message(
                recipient,
                Hollerith::from_latin1(message),
            ))
            .await
    }

    // ---------------------------------------------------------------------
    // Server information
    // ---------------------------------------------------------------------

    /// Sessions active within the last `active_last` seconds (0: all).
    pub async fn who_is_on(
        &self,
        want_invisible: bool,
        active_last: u32,
    ) -> Result<Vec<DynamicSessionInfo>, ClientError> {
        self.client
            .request_as(Request::who_is_on_dynamic(true, want_invisible, active_last))
            .await
    }

    pub async fn lookup_name(
        &self,
        name: &str,
        want_persons: bool,
        want_confs: bool,
    ) -> Result<Vec<ConfZInfo>, ClientError> {
        self.client
            .request_as(Request::lookup_z_name(
                Hollerith::from_latin1(name),
                want_persons,
                want_confs,
            ))
            .await
    }

    pub async fn get_time(&self) -> Result<Time, ClientError> {
        self.client.request_as(Request::get_time()).await
    }

    pub async fn version_info(&self) -> Result<VersionInfo, ClientError> {
        self.client.request_as(Request::get_version_info()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    const TIME: &str = "5 30 14 24 11 125 3 357 0";

    fn conference_body() -> String {
        format!("7HNyheter 00001000 {TIME} {TIME} 6 0 6 0 0 0 77 77 12 1 40 0 0 *")
    }

    fn membership_body(ranges: &str) -> String {
        format!("0 {TIME} 42 255 {ranges} 6 {TIME} 00000000")
    }

    struct MockServer {
        stream: BufReader<DuplexStream>,
    }

    impl MockServer {
        async fn accept(server: DuplexStream) -> Self {
            let mut stream = BufReader::new(server);
            let mut hello = Vec::new();
            stream.read_until(b'\n', &mut hello).await.unwrap();
            stream.get_mut().write_all(b"LysKOM\n").await.unwrap();
            Self { stream }
        }

        /// Reads one request line, returning the ref_no and the rest.
        async fn expect(&mut self, call: u32) -> (u32, String) {
            let mut line = String::new();
            self.stream.read_line(&mut line).await.unwrap();
            let mut fields = line.trim_end().splitn(3, ' ');
            let ref_no = fields.next().unwrap().parse().unwrap();
            assert_eq!(fields.next().unwrap().parse::<u32>().unwrap(), call, "{line}");
            (ref_no, fields.next().unwrap_or("").to_string())
        }

        async fn reply(&mut self, ref_no: u32, body: &str) {
            let line = if body.is_empty() {
                format!("={ref_no}\n")
            } else {
                format!("={ref_no} {body}\n")
            };
            self.send(&line).await;
        }

        async fn send(&mut self, line: &str) {
            self.stream.get_mut().write_all(line.as_bytes()).await.unwrap();
        }
    }

    async fn session(caching: bool) -> (Arc<Session>, MockServer) {
        let (client_side, server_side) = duplex(64 * 1024);
        let session = Arc::new(Session::new(
            ConnectionConfig::new("mock:4894"),
            HandlerTable::new(),
            caching,
        ));

        let connecting = {
            let session = session.clone();
            tokio::spawn(async move { session.connect_with(client_side).await })
        };
        let mut server = MockServer::accept(server_side).await;
        if caching {
            let (ref_no, args) = server.expect(80).await;
            assert!(args.starts_with("12 {"), "{args}");
            server.reply(ref_no, "").await;
        }
        connecting.await.unwrap().unwrap();
        (session, server)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_connect_subscribes_and_enables_caches() {
        let (session, _server) = session(true).await;
        assert!(session.is_connected());
        assert_eq!(session.accepted().len(), CacheCoordinator::KINDS.len());
        assert!(session.caches().conferences.is_enabled());
        assert!(session.caches().text_stats.is_enabled());
        assert!(session.memberships().by_conference().is_enabled());
    }

    #[tokio::test]
    async fn test_cached_conference_refetched_after_new_name() {
        let (session, mut server) = session(true).await;

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.conference(42).await })
        };
        let (ref_no, args) = server.expect(91).await;
        assert_eq!(args, "42");
        server.reply(ref_no, &conference_body()).await;
        assert_eq!(first.await.unwrap().unwrap().no_of_members, 12);

        // Served from the cache without touching the server
        let cached = session.conference(42).await.unwrap();
        assert_eq!(cached.name.to_latin1(), "Nyheter");

        server.send(":3 5 42 7HNyheter 4HNytt\n").await;
        wait_for(|| session.caches().conferences.peek(42).is_none()).await;

        let again = {
            let session = session.clone();
            tokio::spawn(async move { session.conference(42).await })
        };
        let (ref_no, _) = server.expect(91).await;
        server.reply(ref_no, &conference_body()).await;
        again.await.unwrap().unwrap();

        let stats = session.caches().conferences.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_without_caching_always_fetches() {
        let (session, mut server) = session(false).await;
        assert!(session.accepted().is_empty());

        for _ in 0..2 {
            let fetch = {
                let session = session.clone();
                tokio::spawn(async move { session.conference(42).await })
            };
            let (ref_no, _) = server.expect(91).await;
            server.reply(ref_no, &conference_body()).await;
            fetch.await.unwrap().unwrap();
        }
        assert_eq!(session.caches().conferences.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_membership_requires_login() {
        let (session, _server) = session(true).await;
        assert!(matches!(
            session.membership(42).await,
            Err(ClientError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_membership_cached_until_marked_read() {
        let (session, mut server) = session(true).await;

        let login = {
            let session = session.clone();
            tokio::spawn(async move { session.login(6, "gazonk", false).await })
        };
        let (ref_no, args) = server.expect(62).await;
        assert_eq!(args, "6 6Hgazonk 0");
        server.reply(ref_no, "").await;
        login.await.unwrap().unwrap();

        let fetch = {
            let session = session.clone();
            tokio::spawn(async move { session.membership(42).await })
        };
        let (ref_no, args) = server.expect(107).await;
        assert_eq!(args, "6 42 1 0");
        server
            .reply(ref_no, &membership_body("1 { 1 10 }"))
            .await;
        let membership = fetch.await.unwrap().unwrap();
        assert_eq!(membership.read_ranges.len(), 1);
        assert!(session.memberships().by_conference().peek(42).is_some());

        let mark = {
            let session = session.clone();
            tokio::spawn(async move { session.mark_as_read(42, &[11, 12]).await })
        };
        let (ref_no, args) = server.expect(27).await;
        assert_eq!(args, "42 2 { 11 12 }");
        server.reply(ref_no, "").await;
        mark.await.unwrap().unwrap();
        assert!(session.memberships().by_conference().peek(42).is_none());
    }

    #[tokio::test]
    async fn test_resolve_unread_pages_local_to_global() {
        let (session, mut server) = session(false).await;
        let membership: Membership = {
            let mut buf = lyskom_protocol::StreamBuffer::from_slice(
                format!("{}\n", membership_body("1 { 1 10 }")).as_bytes(),
            );
            lyskom_protocol::WireDecode::decode(&mut buf).unwrap()
        };

        let resolve = {
            let session = session.clone();
            tokio::spawn(async move { session.resolve_unread(&membership).await })
        };
        let (ref_no, args) = server.expect(103).await;
        assert_eq!(args, "42 11 255");
        server.reply(ref_no, "11 14 0 1 11 3 { 511 0 513 }").await;

        assert_eq!(resolve.await.unwrap().unwrap(), vec![511, 513]);
    }

    #[tokio::test]
    async fn test_membership_at_out_of_range() {
        let (session, mut server) = session(true).await;
        session.memberships().set_person(Some(6));

        let fetch = {
            let session = session.clone();
            tokio::spawn(async move { session.membership_at(5).await })
        };
        let (ref_no, args) = server.expect(108).await;
        assert_eq!(args, "6 5 1 1 0");
        server.reply(ref_no, "0 *").await;
        let err = fetch.await.unwrap().unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::IndexOutOfRange));
    }

    #[tokio::test]
    async fn test_close_disables_caches() {
        let (session, _server) = session(true).await;
        session.close().await.unwrap();
        assert!(!session.is_connected());
        assert!(!session.caches().conferences.is_enabled());
        assert!(session.accepted().is_empty());
        // Closing twice is harmless
        session.close().await.unwrap();
    }
}
