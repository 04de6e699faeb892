pub mod identity_normalizer;
