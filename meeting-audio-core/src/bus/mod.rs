pub mod audio_bus;
