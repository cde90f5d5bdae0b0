// Shared configuration table keyed by aircraft variant.
//
// Check lists, candidate options and the stage set live here once instead of
// being repeated per screen, so variants cannot drift apart.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::workflow::types::{FlightPlanField, Stage};

pub const FIGHTER_UAV_G: &str = "fighter-uav-g";
pub const SURVEY_UAV: &str = "survey-uav";

/// Candidate values offered for each flight plan field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightPlanOptions {
    pub destination: Vec<String>,
    pub takeoff_direction: Vec<String>,
    pub landing_zone: Vec<String>,
    pub approach: Vec<String>,
}

impl FlightPlanOptions {
    pub fn candidates(&self, field: FlightPlanField) -> &[String] {
        match field {
            FlightPlanField::Destination => &self.destination,
            FlightPlanField::TakeoffDirection => &self.takeoff_direction,
            FlightPlanField::LandingZone => &self.landing_zone,
            FlightPlanField::Approach => &self.approach,
        }
    }

    pub fn permits(&self, field: FlightPlanField, value: &str) -> bool {
        self.candidates(field).iter().any(|candidate| candidate == value)
    }
}

/// Everything that distinguishes one aircraft's workflow from another's
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantProfile {
    /// Display name of the aircraft
    pub aircraft: String,
    pub system_id: u32,
    /// Last stage of this variant's workflow
    pub final_stage: Stage,
    /// Pre-flight checks, in display order
    pub checks: Vec<String>,
    #[serde(default)]
    pub options: FlightPlanOptions,
}

impl VariantProfile {
    pub fn includes(&self, stage: Stage) -> bool {
        stage <= self.final_stage
    }

    pub fn needs_flight_plan(&self) -> bool {
        self.includes(Stage::DestinationSelection)
    }

    /// Describe the first problem with this profile, if any
    pub fn problem(&self) -> Option<String> {
        if self.final_stage < Stage::ChecksComplete {
            return Some(format!(
                "final stage {} ends before pre-flight checks complete",
                self.final_stage
            ));
        }
        if !self.final_stage.awaits_operator() {
            return Some(format!(
                "final stage {} is left on a timer and cannot end the workflow",
                self.final_stage
            ));
        }
        if self.checks.is_empty() {
            return Some("no pre-flight checks defined".to_string());
        }
        if self.needs_flight_plan() {
            if let Some(field) = FlightPlanField::ALL
                .into_iter()
                .find(|field| self.options.candidates(*field).is_empty())
            {
                return Some(format!("no candidate values for {field}"));
            }
        }
        None
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Variants known out of the box
pub fn builtin_variants() -> BTreeMap<String, VariantProfile> {
    let mut variants = BTreeMap::new();

    variants.insert(
        FIGHTER_UAV_G.to_string(),
        VariantProfile {
            aircraft: "Fighter UAV G".to_string(),
            system_id: 37,
            final_stage: Stage::FlightComplete,
            checks: strings(&[
                "Auto Sensor Checks",
                "Motor Checks",
                "Servo Checks",
                "Range-finder Check",
                "Battery Check",
            ]),
            options: FlightPlanOptions {
                destination: strings(&["HQ Node"]),
                takeoff_direction: strings(&["18° [N]"]),
                landing_zone: strings(&["HQ Node location 2"]),
                approach: strings(&["295° [NW]"]),
            },
        },
    );

    // Checks-only workflow: the aircraft is released once checks pass
    variants.insert(
        SURVEY_UAV.to_string(),
        VariantProfile {
            aircraft: "Survey UAV".to_string(),
            system_id: 12,
            final_stage: Stage::ChecksComplete,
            checks: strings(&[
                "Auto Sensor Checks",
                "Motor Checks",
                "Servo Checks",
                "Range-finder Check",
                "Battery Check",
            ]),
            options: FlightPlanOptions::default(),
        },
    );

    variants
}
