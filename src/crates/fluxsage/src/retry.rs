//! Generate-and-validate loop
//!
//! Each attempt asks the model for a query and hands it to a
//! [`QueryValidator`]. A rejected query is fed back to the model together
//! with the rejection text; the loop stops on the first accepted query or
//! when the attempt budget runs out. Errors another attempt cannot fix, such
//! as rejected credentials, end the loop at once. Failures here never escape
//! as errors, they end up in the returned [`SynthesizedQuery`].

use crate::models::{QueryRequest, SynthesizedQuery};
use crate::synthesizer::{Candidate, QuerySynthesizer};
use crate::validator::QueryValidator;
use tracing::{debug, info, warn};

/// What ended the most recent attempt.
enum LastFailure {
    Synthesis(String),
    Validation(String),
}

/// Run up to `request.max_attempts` synthesis attempts.
pub async fn generate_with_retry(
    synthesizer: &QuerySynthesizer,
    validator: &dyn QueryValidator,
    request: &QueryRequest,
) -> SynthesizedQuery {
    let max_attempts = request.max_attempts.max(1);
    let execution_number = request.execution_number.as_deref();

    let mut conversation = synthesizer.start(&request.user_query, execution_number);
    let mut last_query = String::new();
    let mut last_failure = None;

    for attempt in 1..=max_attempts {
        debug!(attempt, max_attempts, "Synthesizing query");

        let query = match synthesizer.synthesize(&conversation).await {
            Ok(Candidate::Query(query)) => query,
            Ok(Candidate::Unsupported(reason)) => {
                info!(attempt, reason = %reason, "Model declined request");
                return SynthesizedQuery::failed(reason.clone(), reason, attempt);
            }
            Err(e) if !e.is_retryable() => {
                warn!(attempt, error = %e, "Synthesis failed, not retrying");
                return SynthesizedQuery::failed(last_query, format!("Generation error: {e}"), attempt);
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "Synthesis attempt failed");
                last_failure = Some(LastFailure::Synthesis(e.to_string()));
                continue;
            }
        };

        match validator.validate(&query, execution_number).await {
            Ok(()) => {
                if attempt > 1 {
                    info!(attempt, "Query accepted after correction");
                } else {
                    debug!(attempt, "Query accepted");
                }
                return SynthesizedQuery::succeeded(query, attempt);
            }
            Err(e) if !e.is_retryable() => {
                warn!(attempt, error = %e, "Query could not be checked, not retrying");
                return SynthesizedQuery::failed(query, e.to_string(), attempt);
            }
            Err(e) => {
                let error = e.to_string();
                if attempt < max_attempts {
                    warn!(attempt, max_attempts, error = %error, "Query rejected, will retry");
                    conversation.push_correction(&query, &error);
                } else {
                    warn!(attempt, error = %error, "Query rejected, attempts exhausted");
                }
                last_query = query;
                last_failure = Some(LastFailure::Validation(error));
            }
        }
    }

    let error = match last_failure {
        Some(LastFailure::Synthesis(message)) => format!("Generation error: {message}"),
        Some(LastFailure::Validation(message)) => message,
        None => String::new(),
    };
    SynthesizedQuery::failed(last_query, error, max_attempts)
}
