pub mod article;
pub mod context;
pub mod outlet;
pub mod outline;
pub mod polish;
pub mod report;
pub mod research;
pub mod workflow;
