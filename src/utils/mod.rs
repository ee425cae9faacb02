pub mod evidence;
pub mod similarity;
pub mod text;
pub mod threads;
pub mod token_estimator;
