//! Tours — the page-anchored onboarding sequences and their steps.

pub mod model;

pub use model::{
    ActiveFilter, DeviceVisibility, LocalizedText, NewStep, NewTour, Side, Step, StepOrder,
    StepPatch, Tour, TourFilter, TourPatch, TourSummary, TourWithSteps, TranslationMap,
};
