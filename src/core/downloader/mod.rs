mod client;

pub use client::{stream_to_file, DownloadEntry, DownloadStats, Downloader, CHUNK_SIZE};
