use procureflow_core::BusinessId;

use crate::EventEnvelope;

/// Messages that belong to exactly one business.
///
/// Workers pinned to a business use this to drop messages addressed to
/// anyone else.
pub trait BusinessScoped {
    fn business_id(&self) -> BusinessId;
}

impl<E> BusinessScoped for EventEnvelope<E> {
    fn business_id(&self) -> BusinessId {
        EventEnvelope::business_id(self)
    }
}
