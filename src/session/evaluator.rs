use tracing::debug;

use crate::domain::decision::DENY_BLACKLISTED;
use crate::domain::Decision;
use crate::storage::PolicyStore;

use super::lifecycle::Session;

/// Decide whether `username` may access `domain`.
///
/// The store holds a per-user *blacklist*: a matching row denies access and
/// an empty result allows it. The session must already be prepared;
/// otherwise the result is an execution error.
pub async fn decide<S: PolicyStore>(
    session: &mut Session<S>,
    username: &str,
    domain: &str,
) -> Decision {
    let decision = match session.execute(username, domain).await {
        Ok(true) => Decision::Deny(DENY_BLACKLISTED),
        Ok(false) => Decision::Allow,
        Err(e) => Decision::Error(e),
    };

    debug!(username, domain, decision = %decision, "Evaluated request");
    decision
}
