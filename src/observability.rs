use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("palaver.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("palaver.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("palaver.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("palaver.stream.events");
pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("palaver.stream.fragments");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("palaver.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("palaver.stream.bytes");
pub(crate) static STREAM_TTFB: Moments = Moments::new("palaver.stream.ttfb_seconds");

pub(crate) static STORE_CREATES: Counter = Counter::new("palaver.store.creates");
pub(crate) static STORE_SAVES: Counter = Counter::new("palaver.store.saves");
pub(crate) static STORE_WRITE_ERRORS: Counter = Counter::new("palaver.store.write_errors");
pub(crate) static STORE_CORRUPT_DOCUMENTS: Counter =
    Counter::new("palaver.store.corrupt_documents");
pub(crate) static STORE_DELETES: Counter = Counter::new("palaver.store.deletes");

pub(crate) static TITLE_REQUESTS: Counter = Counter::new("palaver.title.requests");
pub(crate) static TITLE_FALLBACKS: Counter = Counter::new("palaver.title.fallbacks");

pub(crate) static SESSION_TURNS: Counter = Counter::new("palaver.session.turns");
pub(crate) static SESSION_TURN_FAILURES: Counter = Counter::new("palaver.session.turn_failures");
pub(crate) static SESSION_TURN_DURATION: Moments =
    Moments::new("palaver.session.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFB);

    collector.register_counter(&STORE_CREATES);
    collector.register_counter(&STORE_SAVES);
    collector.register_counter(&STORE_WRITE_ERRORS);
    collector.register_counter(&STORE_CORRUPT_DOCUMENTS);
    collector.register_counter(&STORE_DELETES);

    collector.register_counter(&TITLE_REQUESTS);
    collector.register_counter(&TITLE_FALLBACKS);

    collector.register_counter(&SESSION_TURNS);
    collector.register_counter(&SESSION_TURN_FAILURES);
    collector.register_moments(&SESSION_TURN_DURATION);
}
