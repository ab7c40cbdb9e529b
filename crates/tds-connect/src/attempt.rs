//! A single end-to-end login attempt.

use tds_transport::{Deadline, LoginRecord, ServerInfo, Session, Transport};

use crate::connection::{ConnectionIdentity, TdsConnection};
use crate::error::Result;

impl<T: Transport> TdsConnection<T> {
    /// Open a transport to one resolved target, authenticate, and complete
    /// post-login setup — or fail cleanly with the transport disconnected.
    ///
    /// Identity and session are created together for the attempt and replaced
    /// as a pair on every retry; an attempt never inherits either from a
    /// previous one.
    ///
    /// `ignore_deadline` suppresses the deadline for the transport-open call
    /// only. The very first single-target attempt uses it so connect-phase
    /// time is not double-counted against the retry loop.
    pub(crate) async fn attempt_one_login(
        &mut self,
        server: &ServerInfo,
        ignore_deadline: bool,
        deadline: Deadline,
    ) -> Result<()> {
        self.identity = ConnectionIdentity::from_config(&self.config);

        let open_deadline = if ignore_deadline {
            Deadline::Infinite
        } else {
            deadline
        };
        let extended = server.set_derived_names().to_string();
        tracing::debug!(server = %extended, "opening transport");
        let mut session = self
            .transport
            .open(&extended, open_deadline, self.config.encryption)
            .await?;

        match self.login_and_setup(&mut session, server).await {
            Ok(()) => {
                // Open only after every post-login step succeeded.
                session.mark_open();
                self.session.store(session);
                self.login_complete = true;
                if !self.config.pooled && self.config.auto_enlist {
                    if let Some(transaction) = self.ambient.as_ref().and_then(|a| a.current()) {
                        self.enlist(&transaction);
                    }
                }
                Ok(())
            }
            Err(err) => {
                // A failed login can still have told us about a mirror
                // partner; ingest before tearing the transport down.
                self.ingest_env_changes(&mut session);
                self.transport.disconnect(&mut session).await;
                Err(err)
            }
        }
    }

    async fn login_and_setup(&mut self, session: &mut Session, server: &ServerInfo) -> Result<()> {
        let record = self.build_login_record();
        self.transport.run_login(session, &record).await?;
        // Consume the login acknowledgment before anything else touches the
        // session.
        self.transport.drain(session).await?;
        self.ingest_env_changes(session);

        if self.config.multiplexing {
            let data_source = server.user_server_name().to_string();
            self.transport
                .enable_multiplexing(session, &data_source)
                .await?;
            session.set_mars_enabled(true);
        }
        Ok(())
    }

    fn build_login_record(&self) -> LoginRecord {
        let mut record = LoginRecord {
            host_name: self.config.workstation_name.clone(),
            application_name: self.config.application_name.clone(),
            credentials: self.config.credentials.clone(),
            new_password: self.config.new_password.clone(),
            database: None,
            language: None,
            packet_size: self.identity.packet_size,
            requested_version: self.config.requested_version,
            read_only_intent: self.config.read_only_intent,
        };
        // A user instance attaches to its real target only after the server
        // reports the instance name, so the login record names neither
        // database nor language.
        if !self.config.user_instance {
            record.database = self.config.database.clone();
            record.language = self.config.language.clone();
        }
        record
    }

    /// Take the session out of its slot and disconnect it.
    ///
    /// The slot swap is atomic, so concurrent callers race safely: at most
    /// one observes the session to disconnect, and disconnecting an
    /// already-closed transport is a no-op.
    pub(crate) async fn disconnect_session(&self) {
        if let Some(session_arc) = self.session.take() {
            let mut session = session_arc.lock().await;
            self.transport.disconnect(&mut session).await;
            session.mark_closed();
        }
    }
}
