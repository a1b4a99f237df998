pub mod comments_worker;
pub mod crypto;
pub mod http_counter;
pub mod mock_transport;
pub mod posts_worker;
pub mod queue_mutation;
pub mod rate_limiter;
pub mod reddit_client;
pub mod retry;
pub mod supervisor;
pub mod usage_recorder;

pub use comments_worker::CommentsWorker;
pub use http_counter::CountingTransport;
pub use mock_transport::MockRedditTransport;
pub use posts_worker::PostsWorker;
pub use queue_mutation::QueueMutationService;
pub use rate_limiter::RateLimitOracle;
pub use reddit_client::{RedditClient, RedditTransport};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use usage_recorder::UsageRecorder;
