mod common;
mod engine_tests;
mod fetcher_tests;
