pub mod connection_reaper;
