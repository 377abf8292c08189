pub mod timing;

pub use timing::{latency_middleware, RequestContext, RequestInterceptor, UNMATCHED_PATH};
