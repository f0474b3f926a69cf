//! Integration tests for the SRTLA workspace live in `tests/`.
