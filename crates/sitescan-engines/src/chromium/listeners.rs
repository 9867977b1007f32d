use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chromiumoxide::cdp::browser_protocol::log::{
    EnableParams as LogEnableParams, EventEntryAdded, LogEntryLevel, LogEntrySource,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, EventResponseReceived, ResourceType, Response,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventDomContentEventFired, EventFrameNavigated, FrameId,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EnableParams as RuntimeEnableParams, EventConsoleApiCalled,
    EventExecutionContextCreated, EventExecutionContextsCleared, RemoteObject,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::activity::PageActivity;
use crate::signals::{
    ConsoleLevel, ConsoleSignal, FailureReason, PageSignal, RequestFailure, ResponseSignal,
    SignalSender,
};

/// Subscribes to every event stream the scan needs and forwards them as
/// [`PageSignal`]s. Each returned task owns a clone of `signals`; aborting the
/// tasks releases the channel.
pub(crate) async fn spawn(
    page: &Page,
    activity: Arc<PageActivity>,
    signals: SignalSender,
) -> Result<Vec<JoinHandle<()>>> {
    let main_frame = page.mainframe().await?;

    let navigated = page.event_listener::<EventFrameNavigated>().await?;
    let dom_ready = page.event_listener::<EventDomContentEventFired>().await?;
    let contexts = page.event_listener::<EventExecutionContextCreated>().await?;
    let cleared = page.event_listener::<EventExecutionContextsCleared>().await?;
    let console = page.event_listener::<EventConsoleApiCalled>().await?;
    let log_entries = page.event_listener::<EventEntryAdded>().await?;
    let requests = page.event_listener::<EventRequestWillBeSent>().await?;
    let responses = page.event_listener::<EventResponseReceived>().await?;
    let finished = page.event_listener::<EventLoadingFinished>().await?;
    let failed = page.event_listener::<EventLoadingFailed>().await?;

    // Both domains are normally enabled at target attach already.
    if let Err(error) = page.execute(RuntimeEnableParams::default()).await {
        tracing::debug!(target: "sitescan_engines", error = %error, "Runtime.enable failed");
    }
    if let Err(error) = page.execute(NetworkEnableParams::default()).await {
        tracing::debug!(target: "sitescan_engines", error = %error, "Network.enable failed");
    }
    // Browser-side entries: failed resource loads, CSP and mixed-content reports.
    if let Err(error) = page.execute(LogEnableParams::default()).await {
        tracing::debug!(target: "sitescan_engines", error = %error, "Log.enable failed");
    }

    let document_task = {
        let activity = activity.clone();
        let (mut navigated, mut dom_ready) = (navigated, dom_ready);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = navigated.next() => {
                        if event.frame.parent_id.is_none() {
                            tracing::debug!(
                                target: "sitescan_engines",
                                url = %event.frame.url,
                                "main frame navigated"
                            );
                            activity.page_url.send_replace(Some(event.frame.url.clone()));
                        }
                    }
                    Some(_) = dom_ready.next() => {
                        activity.dom_content_loaded.send_modify(|count| *count += 1);
                    }
                    else => break,
                }
            }
        })
    };

    let runtime_task = {
        let activity = activity.clone();
        let signals = signals.clone();
        let (mut contexts, mut cleared, mut console, mut log_entries) =
            (contexts, cleared, console, log_entries);
        tokio::spawn(async move {
            let mut origins: HashMap<i64, String> = HashMap::new();
            loop {
                tokio::select! {
                    Some(event) = contexts.next() => {
                        origins.insert(*event.context.id.inner(), event.context.origin.clone());
                    }
                    Some(_) = cleared.next() => origins.clear(),
                    Some(event) = console.next() => {
                        let level = match event.r#type {
                            ConsoleApiCalledType::Error => ConsoleLevel::Error,
                            ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
                            _ => continue,
                        };
                        let top_frame = event
                            .stack_trace
                            .as_ref()
                            .and_then(|trace| trace.call_frames.first());
                        let signal = ConsoleSignal {
                            level,
                            text: console_text(&event.args),
                            location_url: top_frame
                                .map(|frame| frame.url.clone())
                                .filter(|url| !url.is_empty()),
                            line: top_frame.and_then(|frame| u32::try_from(frame.line_number).ok()),
                            page_url: activity.page_url.borrow().clone(),
                            context_origin: origins.get(event.execution_context_id.inner()).cloned(),
                        };
                        let _ = signals.send(PageSignal::Console(signal));
                    }
                    Some(event) = log_entries.next() => {
                        let entry = &event.entry;
                        let Some(level) = log_level(&entry.source, &entry.level) else {
                            continue;
                        };
                        let signal = ConsoleSignal {
                            level,
                            text: entry.text.clone(),
                            location_url: entry.url.clone().filter(|url| !url.is_empty()),
                            line: entry.line_number.and_then(|line| u32::try_from(line).ok()),
                            page_url: activity.page_url.borrow().clone(),
                            context_origin: None,
                        };
                        let _ = signals.send(PageSignal::Console(signal));
                    }
                    else => break,
                }
            }
        })
    };

    let network_task = {
        let (mut requests, mut responses, mut finished, mut failed) =
            (requests, responses, finished, failed);
        tokio::spawn(async move {
            let mut pending: HashMap<String, String> = HashMap::new();
            loop {
                tokio::select! {
                    Some(event) = requests.next() => {
                        if let Some(redirect) = event.redirect_response.as_ref() {
                            let document = matches!(event.r#type, Some(ResourceType::Document));
                            let signal = response_signal(
                                redirect,
                                document && is_main_frame(event.frame_id.as_ref(), main_frame.as_ref()),
                            );
                            let _ = signals.send(PageSignal::Response(signal));
                        }
                        pending.insert(event.request_id.inner().clone(), event.request.url.clone());
                        activity.inflight.send_replace(pending.len());
                    }
                    Some(event) = responses.next() => {
                        let document = matches!(event.r#type, ResourceType::Document);
                        let signal = response_signal(
                            &event.response,
                            document && is_main_frame(event.frame_id.as_ref(), main_frame.as_ref()),
                        );
                        let _ = signals.send(PageSignal::Response(signal));
                    }
                    Some(event) = finished.next() => {
                        pending.remove(event.request_id.inner());
                        activity.inflight.send_replace(pending.len());
                    }
                    Some(event) = failed.next() => {
                        let url = pending.remove(event.request_id.inner()).unwrap_or_default();
                        activity.inflight.send_replace(pending.len());
                        let failure = RequestFailure {
                            url,
                            reason: FailureReason::from_protocol(
                                &event.error_text,
                                event.canceled.unwrap_or(false),
                            ),
                            error_text: event.error_text.clone(),
                        };
                        let _ = signals.send(PageSignal::RequestFailed(failure));
                    }
                    else => break,
                }
            }
        })
    };

    Ok(vec![document_task, runtime_task, network_task])
}

fn response_signal(response: &Response, main_frame_document: bool) -> ResponseSignal {
    ResponseSignal {
        url: response.url.clone(),
        status: u16::try_from(response.status).unwrap_or_default(),
        main_frame_document,
    }
}

/// Renders console arguments the way DevTools prints them: space separated,
/// strings unquoted.
fn console_text(args: &[RemoteObject]) -> String {
    args.iter()
        .filter_map(|arg| match (&arg.value, &arg.description) {
            (Some(serde_json::Value::String(text)), _) => Some(text.clone()),
            (Some(value), _) => Some(value.to_string()),
            (None, Some(description)) => Some(description.clone()),
            (None, None) => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Worker entries are reported by their own targets and are skipped here.
fn log_level(source: &LogEntrySource, level: &LogEntryLevel) -> Option<ConsoleLevel> {
    if matches!(source, LogEntrySource::Worker) {
        return None;
    }
    match level {
        LogEntryLevel::Error => Some(ConsoleLevel::Error),
        LogEntryLevel::Warning => Some(ConsoleLevel::Warning),
        _ => None,
    }
}

fn is_main_frame(frame_id: Option<&FrameId>, main_frame: Option<&FrameId>) -> bool {
    frame_id.is_some() && frame_id == main_frame
}
