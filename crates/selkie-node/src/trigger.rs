//! Trigger dispatcher for function-style workloads
//!
//! TigerStyle: Per-message dispatch, no shared locks on the hot path.
//!
//! Every trigger subject declared by an accepted deployment gets a
//! subscription on the external bus whose handler forwards the message to
//! the agent, records timing and outcome, and replies with the agent's
//! response. Dispatches run concurrently across messages and workloads;
//! the dispatcher never touches the pool.

use crate::events::EventRelay;
use crate::manager::ManagerStatsInner;
use selkie_agent::{AgentClient, RUNTIME_NS_HEADER};
use selkie_bus::{Bus, Headers, Message, MessageHandler};
use selkie_core::{metrics, ShutdownSignal};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info_span, warn, Instrument, Span};

/// Everything one trigger subscription needs, captured at install time
pub(crate) struct TriggerContext {
    pub bus: Arc<dyn Bus>,
    pub agent: Arc<AgentClient>,
    pub workload_id: String,
    pub workload_name: String,
    pub workload_type: String,
    pub namespace: String,
    pub trigger_subject: String,
    pub stats: Arc<ManagerStatsInner>,
    pub relay: EventRelay,
    pub shutdown: ShutdownSignal,
}

/// Build the bus handler for one trigger subject of one workload
pub(crate) fn trigger_handler(ctx: TriggerContext) -> MessageHandler {
    let ctx = Arc::new(ctx);

    Arc::new(move |msg: Message| {
        let ctx = Arc::clone(&ctx);
        Box::pin(async move { dispatch(ctx, msg).await })
    })
}

async fn dispatch(ctx: Arc<TriggerContext>, msg: Message) {
    let span = info_span!(
        "workload-trigger",
        otel.kind = "server",
        workload_name = %ctx.workload_name,
        namespace = %ctx.namespace,
        trigger_subject = %msg.subject,
        outcome = tracing::field::Empty,
    );

    async move {
        let result = tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                debug!(workload_id = %ctx.workload_id, "node shutting down, abandoning trigger dispatch");
                return;
            }
            result = ctx.agent.run_trigger(&msg.subject, msg.payload.clone()) => result,
        };

        match result {
            Err(e) => {
                Span::current().record("outcome", "error");
                error!(
                    error = %e,
                    trigger_subject = %ctx.trigger_subject,
                    workload_type = %ctx.workload_type,
                    workload_id = %ctx.workload_id,
                    "failed to request agent execution via trigger subject"
                );

                ctx.stats
                    .function_triggers_failed
                    .fetch_add(1, Ordering::SeqCst);
                metrics::record_function_trigger_failed(&ctx.namespace, &ctx.workload_name);

                ctx.relay
                    .publish_function_exec_failed(
                        &ctx.namespace,
                        &ctx.workload_id,
                        &ctx.workload_name,
                        &ctx.trigger_subject,
                        &e.to_string(),
                    )
                    .await;
            }
            Ok(response) => {
                Span::current().record("outcome", "ok");

                let runtime_header = response.header(RUNTIME_NS_HEADER).unwrap_or_default();
                debug!(
                    workload_id = %ctx.workload_id,
                    trigger_subject = %ctx.trigger_subject,
                    workload_type = %ctx.workload_type,
                    function_run_time_nanosec = runtime_header,
                    payload_size = response.payload.len(),
                    "received response from execution via trigger subject"
                );

                let run_time_ns = match runtime_header.parse::<u64>() {
                    Ok(ns) => ns,
                    Err(e) => {
                        warn!(error = %e, "failed to log function runtime");
                        0
                    }
                };

                ctx.relay
                    .publish_function_exec_succeeded(
                        &ctx.namespace,
                        &ctx.workload_id,
                        &ctx.trigger_subject,
                        run_time_ns,
                    )
                    .await;

                ctx.stats.function_triggers.fetch_add(1, Ordering::SeqCst);
                ctx.stats
                    .function_runtime_ns
                    .fetch_add(run_time_ns, Ordering::SeqCst);
                ctx.stats
                    .add_workload_runtime(&ctx.workload_id, run_time_ns);
                metrics::record_function_trigger(&ctx.namespace, &ctx.workload_name, run_time_ns);

                if msg.reply.is_some() {
                    if let Err(e) = ctx
                        .bus
                        .respond(&msg, response.payload.clone(), Headers::new())
                        .await
                    {
                        Span::current().record("outcome", "reply_failed");
                        error!(
                            error = %e,
                            workload_id = %ctx.workload_id,
                            trigger_subject = %ctx.trigger_subject,
                            workload_type = %ctx.workload_type,
                            "failed to respond to trigger subject subscription request for deployed workload"
                        );
                    }
                }
            }
        }
    }
    .instrument(span)
    .await;
}
