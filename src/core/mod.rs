// ─── UnixLauncher Core ───
// Install, authenticate and launch orchestration for a Minecraft launcher,
// plus the release bootstrapper that installs the launcher itself.
//
// Architecture:
//   core/
//     version/    — Mojang manifest, version JSON, base installer
//     maven/      — Artifact coordinates + maven-metadata.xml
//     downloader/ — Concurrent downloads with SHA-1 validation
//     assets/     — Asset index + object downloads
//     loaders/    — Fabric, Quilt, Forge
//     launch/     — Command builder + run orchestrator
//     auth/       — Microsoft/Xbox login and the identity record
//     java/       — Java binary resolution
//     release/    — GitHub latest-release lookup
//     bootstrap/  — Acquire-and-run for the launcher package
//     state/      — Settings, endpoints and shared services

pub mod archive;
pub mod assets;
pub mod auth;
pub mod bootstrap;
pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod loaders;
pub mod maven;
pub mod process;
pub mod progress;
pub mod release;
pub mod state;
pub mod version;

#[cfg(test)]
pub mod test_support;
