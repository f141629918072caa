/// Signature verification pipeline for DHT results
///
/// Results are checked against the publisher's public key (itself a cached
/// resource). The pre-mutation state is stashed so a failed check rolls the
/// resource back. Checks are paced: each one is deferred by
/// `in_flight * average_cost * 2` milliseconds, where the average is an
/// exponential moving average of measured verification time.
use crate::{
    context::ClientContext,
    error::{ClientError, ClientResult},
    kinds::pubkey,
    metrics,
    resource::{Resource, ResourceSnapshot, ResourceState, NEVER_UPDATED},
    rpc::{DhtEntry, DhtTarget},
    settings::{self, names, QuerySettings, VerificationMode},
};
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cost assumed for a verification before any has been measured
const INITIAL_AVERAGE_MS: f64 = 10.0;

/// Writes a DHT entry into a resource's state at `now`
pub type ApplyEntry = fn(&mut ResourceState, &DhtEntry, f64);

/// Adaptive pacing state and the verification policy
pub struct SignatureVerificationPipeline {
    in_flight: AtomicUsize,
    /// f64 bits of the average verification time in milliseconds
    average_ms: AtomicU64,
}

/// Keeps the in-flight counter honest if a paced check is dropped
struct Pending<'a>(&'a AtomicUsize);

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for SignatureVerificationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerificationPipeline {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            average_ms: AtomicU64::new(INITIAL_AVERAGE_MS.to_bits()),
        }
    }

    /// Verifications waiting for their pacing delay
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn average_ms(&self) -> f64 {
        f64::from_bits(self.average_ms.load(Ordering::SeqCst))
    }

    /// Fold one measured verification time into the moving average
    pub fn record_sample(&self, sample_ms: f64) {
        let _ = self
            .average_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                let avg = f64::from_bits(bits);
                Some((0.9 * avg + 0.1 * sample_ms).to_bits())
            });
    }

    /// Delay applied to a verification entering with `in_flight` others queued
    pub fn pacing_delay(&self, in_flight: usize) -> Duration {
        let millis = in_flight as f64 * self.average_ms() * 2.0;
        Duration::from_secs_f64((millis / 1000.0).max(0.0))
    }

    /// Accept a DHT entry into `resource`, verifying it when the policy and
    /// namespace require it.
    ///
    /// Returns once the entry may be delivered: immediately for unsigned
    /// data and background mode, after the check in instant mode.
    pub async fn accept(
        &self,
        ctx: &ClientContext,
        resource: &Arc<Resource>,
        target: &DhtTarget,
        entry: DhtEntry,
        apply: ApplyEntry,
    ) -> ClientResult<()> {
        let mode = resource.setting(ctx, names::SIGNATURE_VERIFICATION).await?;
        let mode: VerificationMode = settings::as_string(names::SIGNATURE_VERIFICATION, &mode)?.parse()?;

        if mode == VerificationMode::None || !target.needs_signature(&entry.sig_user) {
            debug!("no signature verification needed for {}", target);
            let mut state = resource.state.write().await;
            apply(&mut state, &entry, ctx.now());
            state.verified = true;
            state.pending_since = None;
            return Ok(());
        }

        debug!("issuing signature verification for {} ({})", target, mode);
        let stash = resource.flatten().await;

        match mode {
            VerificationMode::Background => {
                {
                    let mut state = resource.state.write().await;
                    apply(&mut state, &entry, ctx.now());
                    state.pending_since = Some(state.last_update);
                    state.verified = false;
                    state.last_update = NEVER_UPDATED;
                }

                let ctx = ctx.clone();
                let resource = Arc::clone(resource);
                tokio::spawn(async move {
                    let outcome = ctx.verification().check(&ctx, &entry).await;
                    settle_background(&ctx, &resource, &entry, outcome, stash).await;
                });

                Ok(())
            }
            _ => match self.check(ctx, &entry).await {
                Ok(true) => {
                    let mut state = resource.state.write().await;
                    apply(&mut state, &entry, ctx.now());
                    state.verified = true;
                    state.pending_since = None;
                    Ok(())
                }
                Ok(false) => {
                    resource.inflate(stash).await;
                    Err(ClientError::SignatureVerificationFailed)
                }
                Err(e) => {
                    resource.inflate(stash).await;
                    Err(e)
                }
            },
        }
    }

    /// Check an entry's signature against its publisher's key, paced
    pub async fn check(&self, ctx: &ClientContext, entry: &DhtEntry) -> ClientResult<bool> {
        let key = ctx.user(&entry.sig_user).await.pubkey();
        let key_snapshot = key
            .satisfy_unreported(ctx, QuerySettings::new())
            .boxed()
            .await?;
        let Some(key_hex) = pubkey::key_hex(&key_snapshot) else {
            warn!("no public key known for {}", entry.sig_user);
            return Ok(false);
        };

        let queued = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let _pending = Pending(&self.in_flight);
            let delay = self.pacing_delay(queued);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let started = Instant::now();
        let message = entry.p.signed_value();
        let verified = ctx
            .signature_verifier()
            .verify(&key_hex, &message, &entry.sig_p)
            .unwrap_or_else(|e| {
                warn!("signature of {} could not be checked: {}", entry.sig_user, e);
                false
            });
        let elapsed = started.elapsed();

        self.record_sample(elapsed.as_secs_f64() * 1000.0);
        metrics::record_signature_verification(verified, elapsed.as_secs_f64());

        Ok(verified)
    }
}

/// Confirm or roll back an entry that was delivered before its check
async fn settle_background(
    ctx: &ClientContext,
    resource: &Arc<Resource>,
    entry: &DhtEntry,
    outcome: ClientResult<bool>,
    stash: ResourceSnapshot,
) {
    let applied_at = {
        let state = resource.state.read().await;
        state
            .pending_since
            .filter(|_| state.revision_number == Some(entry.p.seq))
    };
    let Some(applied_at) = applied_at else {
        debug!("verification of {} superseded", resource.key());
        return;
    };
    match outcome {
        Ok(true) => {
            let mut state = resource.state.write().await;
            state.mark_fresh(applied_at);
        }
        Ok(false) => {
            resource.inflate(stash).await;
            ctx.report_error(resource.key(), &ClientError::SignatureVerificationFailed);
        }
        Err(e) => {
            resource.inflate(stash).await;
            ctx.report_error(resource.key(), &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average() {
        let pipeline = SignatureVerificationPipeline::new();
        pipeline.record_sample(110.0);
        assert!((pipeline.average_ms() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_pacing_delay_scales_with_queue() {
        let pipeline = SignatureVerificationPipeline::new();
        assert_eq!(pipeline.pacing_delay(0), Duration::ZERO);
        assert_eq!(pipeline.pacing_delay(1), Duration::from_millis(20));
        assert_eq!(pipeline.pacing_delay(3), Duration::from_millis(60));
    }
}
