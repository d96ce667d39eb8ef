// Match browsing: the raw candidate list is fetched once per document and
// every filter/sort/page change is served by the engine from the cache.

pub mod cache;
pub mod engine;
pub mod handlers;
pub mod insight;
