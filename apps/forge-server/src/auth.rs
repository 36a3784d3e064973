use anyhow::bail;
use axum::http::HeaderMap;
use chrono::{Local, Utc};
use forge_core::{signing, timefmt};
use forge_protocol::{
    agent_info_key, AgentInfo, BOOTSTRAP_SECRET, HEADER_APP_ID, HEADER_SIGN, HEADER_TIME,
    VERIFY_REFRESH_TTL_SECS,
};
use forge_store::Store;
use tracing::debug;

use crate::app_state::AppState;

pub(crate) const MISSING_HEADERS: &str = "appid, sign, and time are required";
const VERIFY_FAILED: &str = "signature verification failed";

/// The three signing headers every call carries.
pub(crate) struct SignedArgs {
    pub app_id: String,
    pub date_time: String,
    pub sign: String,
}

/// Extract the signing headers; `None` when any is missing or empty.
pub(crate) fn signed_args(headers: &HeaderMap) -> Option<SignedArgs> {
    let fetch = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    Some(SignedArgs {
        app_id: fetch(HEADER_APP_ID)?,
        date_time: fetch(HEADER_TIME)?,
        sign: fetch(HEADER_SIGN)?,
    })
}

fn check_window(args: &SignedArgs) -> anyhow::Result<()> {
    if !timefmt::within_skew(&args.date_time, Local::now()) {
        debug!(app_id = %args.app_id, date_time = %args.date_time, "request timestamp outside window");
        bail!(VERIFY_FAILED);
    }
    Ok(())
}

/// Verify a register call: timestamp window plus an HMAC keyed with the
/// bootstrap secret. No agent record is consulted.
pub(crate) fn verify_bootstrap(args: &SignedArgs, body: &str) -> anyhow::Result<()> {
    check_window(args)?;
    if !signing::verify_signature(&args.app_id, BOOTSTRAP_SECRET, body, &args.date_time, &args.sign)
    {
        bail!(VERIFY_FAILED);
    }
    Ok(())
}

/// Verify a session call against the stored agent record, then refresh
/// `last_ping_time`. The refresh write deliberately uses the shorter
/// one-day TTL.
pub(crate) async fn verify_session(
    state: &AppState,
    args: &SignedArgs,
    body: &str,
) -> anyhow::Result<AgentInfo> {
    check_window(args)?;
    let key = agent_info_key(&args.app_id);
    let Some(raw) = state.store().get(&key).await? else {
        debug!(app_id = %args.app_id, "no agent record for signed call");
        bail!(VERIFY_FAILED);
    };
    let mut info: AgentInfo = serde_json::from_slice(&raw)?;
    if !signing::verify_signature(&info.app_id, &info.secret, body, &args.date_time, &args.sign) {
        bail!(VERIFY_FAILED);
    }
    info.last_ping_time = Utc::now().timestamp();
    state
        .store()
        .set_ex(&key, VERIFY_REFRESH_TTL_SECS, &serde_json::to_vec(&info)?)
        .await?;
    Ok(info)
}
