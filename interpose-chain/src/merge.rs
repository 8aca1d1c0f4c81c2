//! Folding one module result into the envelope.

use interpose_types::{Envelope, FailureReason, ModuleResult};

/// Apply `result` to `envelope` in place.
///
/// - `Unchanged` leaves the envelope as it is.
/// - `Transformed` replaces the payload wholesale and overwrites each
///   header key present in the update; other headers are kept. A key
///   cannot be deleted by leaving it out.
/// - `Failed` applies nothing and hands the reason back.
///
/// Direction and route hints are never touched.
pub fn merge(envelope: &mut Envelope, result: ModuleResult) -> Result<(), FailureReason> {
    match result {
        ModuleResult::Unchanged => Ok(()),
        ModuleResult::Transformed { payload, headers } => {
            envelope.payload = payload;
            if let Some(updates) = headers {
                envelope.headers.apply(updates);
            }
            Ok(())
        }
        ModuleResult::Failed(reason) => Err(reason),
    }
}
