mod artifact;
mod metadata;

pub use artifact::MavenArtifact;
pub use metadata::MavenMetadata;

/// Well-known Maven repositories used by the Minecraft ecosystem.
pub const MOJANG_LIBRARIES: &str = "https://libraries.minecraft.net";
pub const FORGE_MAVEN: &str = "https://maven.minecraftforge.net";
pub const FABRIC_MAVEN: &str = "https://maven.fabricmc.net";
pub const QUILT_MAVEN: &str = "https://maven.quiltmc.org/repository/release";
