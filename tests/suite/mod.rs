mod compression;
mod passthrough;
