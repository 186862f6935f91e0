pub mod analysis;
pub mod db;
pub mod environment;
pub mod eval;
pub mod evaluated_data;
pub mod file_system;
pub mod line_index;

#[cfg(test)]
mod tests;
