pub mod extract;
pub mod fetcher;
pub mod markdown;

pub use extract::{FeedStrategy, HtmlStrategy, JsonStrategy, TocStrategy, default_registry};
pub use fetcher::ReqwestFetcher;
pub use markdown::MarkdownConverter;
