//! Supersession of in-flight queries.

use tokio_util::sync::CancellationToken;

/// One logical query target, such as the directory pane of a device.
///
/// Beginning a query cancels the previous one. Dropping the target
/// cancels whatever is still in flight.
#[derive(Debug, Default)]
pub struct QueryTarget {
    current: Option<CancellationToken>,
}

impl QueryTarget {
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Cancel the in-flight query, if any, and issue a ticket for the next.
    pub fn begin(&mut self) -> QueryTicket {
        self.cancel();
        let token = CancellationToken::new();
        self.current = Some(token.clone());
        QueryTicket { token }
    }

    /// Cancel the in-flight query without starting another.
    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }
}

impl Drop for QueryTarget {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Permission for one query to keep running.
#[derive(Debug, Clone)]
pub struct QueryTicket {
    token: CancellationToken,
}

impl QueryTicket {
    /// A ticket no target can supersede.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Whether a newer query has superseded this one.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this ticket is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_cancels_previous() {
        let mut target = QueryTarget::new();
        let first = target.begin();
        assert!(!first.is_cancelled());

        let second = target.begin();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_dropping_target_cancels() {
        let mut target = QueryTarget::new();
        let ticket = target.begin();
        drop(target);
        assert!(ticket.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves() {
        let mut target = QueryTarget::new();
        let ticket = target.begin();
        target.cancel();
        ticket.cancelled().await;
        assert!(!QueryTicket::detached().is_cancelled());
    }
}
