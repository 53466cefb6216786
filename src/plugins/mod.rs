pub mod offline;
pub mod registry;
pub mod ytdlp;

#[cfg(test)]
pub mod fake;
