/// Background task implementations
use crate::context::ClientContext;
use tracing::debug;

/// Drop cache entries not refreshed within the last `max_age_secs`
pub async fn trim_cache(ctx: &ClientContext, max_age_secs: u64) -> usize {
    let cutoff = ctx.now() - max_age_secs as f64;
    debug!("trimming cache entries refreshed before {}", cutoff);
    ctx.trim(Some(cutoff)).await
}
