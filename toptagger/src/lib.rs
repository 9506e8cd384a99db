// physics module
pub mod physics {
    pub mod lorentz;
    pub mod constituent;
    pub mod top_object;
    pub mod truth;
    pub mod mt2;
}

// input module
pub mod input {
    pub mod packager;
    pub mod ak4;
    pub mod ak8;
    pub mod resolved;
    pub mod cleaning;
    pub mod calibration;
    pub mod event;
}

// tagger module
pub mod tagger {
    pub mod config;
    pub mod assembler;
    pub mod results;
    pub mod discriminant;
    pub mod features;
    pub mod modules;
    pub mod top_tagger;
}

pub mod error;
