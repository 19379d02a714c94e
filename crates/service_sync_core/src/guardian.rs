//! Long-lived database connection shared across invocations.
//!
//! The guardian is created once per process and passed into each invocation.
//! [`ConnectionGuardian::acquire`] checks liveness before any query runs and
//! reconnects transparently; when reconnecting fails the caller gets a
//! [`StoreError::Connection`] and must not attempt reconciliation.

use crate::store::StoreError;

pub trait Connector {
    type Connection;

    fn connect(&self) -> Result<Self::Connection, StoreError>;

    fn ping(&self, connection: &mut Self::Connection) -> Result<(), StoreError>;
}

pub struct ConnectionGuardian<C: Connector> {
    connector: C,
    connection: Option<C::Connection>,
    reconnects: u64,
}

impl<C: Connector> ConnectionGuardian<C> {
    /// Creates a guardian without connecting; the first `acquire` connects.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            connection: None,
            reconnects: 0,
        }
    }

    /// Creates a guardian and opens the connection immediately.
    pub fn connect(connector: C) -> Result<Self, StoreError> {
        let connection = connector.connect()?;
        tracing::info!(
            component = "connection_guardian",
            event = "connected",
            "database connection established"
        );
        Ok(Self {
            connector,
            connection: Some(connection),
            reconnects: 0,
        })
    }

    pub fn acquire(&mut self) -> Result<&mut C::Connection, StoreError> {
        let alive = match self.connection.as_mut() {
            Some(connection) => match self.connector.ping(connection) {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!(
                        component = "connection_guardian",
                        event = "ping_failed",
                        error = %error,
                        "stale database connection, reconnecting"
                    );
                    false
                }
            },
            None => false,
        };

        if !alive {
            self.connection = None;
            let fresh = self.connector.connect().map_err(|error| {
                tracing::error!(
                    component = "connection_guardian",
                    event = "reconnect_failed",
                    error = %error,
                    "database reconnect failed"
                );
                error
            })?;
            self.reconnects += 1;
            tracing::info!(
                component = "connection_guardian",
                event = "reconnected",
                reconnects = self.reconnects,
                "database connection established"
            );
            self.connection = Some(fresh);
        }

        self.connection
            .as_mut()
            .ok_or_else(|| StoreError::Connection("no connection after reconnect".to_string()))
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    #[derive(Default)]
    struct ScriptedConnector {
        connects: Cell<u32>,
        connect_failures: RefCell<Vec<bool>>,
        ping_failures: RefCell<Vec<bool>>,
    }

    impl ScriptedConnector {
        fn failing_connects(script: &[bool]) -> Self {
            Self {
                connect_failures: RefCell::new(script.iter().rev().copied().collect()),
                ..Self::default()
            }
        }
    }

    impl Connector for ScriptedConnector {
        type Connection = u32;

        fn connect(&self) -> Result<u32, StoreError> {
            if self.connect_failures.borrow_mut().pop().unwrap_or(false) {
                return Err(StoreError::Connection("refused".to_string()));
            }
            self.connects.set(self.connects.get() + 1);
            Ok(self.connects.get())
        }

        fn ping(&self, _connection: &mut u32) -> Result<(), StoreError> {
            if self.ping_failures.borrow_mut().pop().unwrap_or(false) {
                return Err(StoreError::Connection("gone away".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn reuses_live_connection() {
        let mut guardian = ConnectionGuardian::connect(ScriptedConnector::default())
            .expect("initial connect");

        assert_eq!(*guardian.acquire().expect("first acquire"), 1);
        assert_eq!(*guardian.acquire().expect("second acquire"), 1);
        assert_eq!(guardian.reconnects(), 0);
    }

    #[test]
    fn reconnects_after_failed_ping() {
        let connector = ScriptedConnector {
            ping_failures: RefCell::new(vec![true]),
            ..ScriptedConnector::default()
        };
        let mut guardian = ConnectionGuardian::connect(connector).expect("initial connect");

        assert_eq!(*guardian.acquire().expect("acquire"), 2);
        assert_eq!(guardian.reconnects(), 1);
    }

    #[test]
    fn lazy_guardian_connects_on_first_acquire() {
        let mut guardian = ConnectionGuardian::new(ScriptedConnector::default());
        assert!(!guardian.is_connected());

        assert_eq!(*guardian.acquire().expect("acquire"), 1);
        assert!(guardian.is_connected());
    }

    #[test]
    fn failed_reconnect_is_reported_and_retried_next_time() {
        let mut guardian = ConnectionGuardian::new(ScriptedConnector::failing_connects(&[true]));

        let error = guardian.acquire().expect_err("reconnect should fail");
        assert!(matches!(error, StoreError::Connection(_)));
        assert!(!guardian.is_connected());

        assert!(guardian.acquire().is_ok());
    }
}
