//! The intelligent driver model: a closed-form car-following law balancing
//! free-road acceleration against a desired following gap.

/// The simulation-wide parameters of the intelligent driver model.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdmParams {
    /// Desired velocity in free traffic, in m/s.
    pub target_velocity: f64,
    /// Minimum relative distance to the lead agent, in m.
    pub min_gap_to_lead_agent: f64,
    /// Desired time headway to the lead agent, in s.
    pub headway_time: f64,
    /// Maximum acceleration, in m/s^2.
    pub accel_max: f64,
    /// Maximum comfortable deceleration, a positive value in m/s^2.
    pub decel_max: f64,
}

impl Default for IdmParams {
    fn default() -> Self {
        Self {
            target_velocity: 10.0,
            min_gap_to_lead_agent: 1.0,
            headway_time: 1.5,
            accel_max: 1.0,
            decel_max: 2.0,
        }
    }
}

/// The kinematics of a lead obstacle as seen by a following agent.
#[derive(Clone, Copy, Debug)]
pub struct LeadKinematics {
    /// Bumper-to-bumper distance to the lead, in m.
    /// Callers floor this at a small positive value.
    pub net_distance: f64,
    /// The lead's velocity in m/s.
    pub velocity: f64,
}

/// Computes the longitudinal acceleration of an agent using the
/// intelligent driver model.
///
/// With no lead, the interaction term is omitted and the result is the
/// free-road acceleration. The output is unclamped; integration is
/// responsible for keeping the resulting velocity non-negative.
///
/// # Parameters
/// * `vel` - The agent's velocity in m/s
/// * `desired_vel` - The agent's desired free-traffic velocity in m/s
/// * `lead` - The lead obstacle, if any
pub fn idm_acceleration(
    params: &IdmParams,
    vel: f64,
    desired_vel: f64,
    lead: Option<&LeadKinematics>,
) -> f64 {
    let free_term = 1.0 - (vel / desired_vel).powi(4);
    match lead {
        None => params.accel_max * free_term,
        Some(lead) => {
            let appr = vel - lead.velocity;
            let factor = 1.0 / (2.0 * (params.accel_max * params.decel_max).sqrt());
            let ss = params.min_gap_to_lead_agent + vel * params.headway_time + vel * appr * factor;
            let term = ss / lead.net_distance;
            params.accel_max * (free_term - term * term)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn free_flow_equilibrium() {
        let params = IdmParams::default();
        let acc = idm_acceleration(&params, params.target_velocity, params.target_velocity, None);
        assert_approx_eq!(acc, 0.0);
    }

    #[test]
    fn free_road_acceleration_from_rest() {
        let params = IdmParams::default();
        let acc = idm_acceleration(&params, 0.0, params.target_velocity, None);
        assert_approx_eq!(acc, params.accel_max);
    }

    #[test]
    fn lead_suppresses_acceleration() {
        let params = IdmParams::default();
        let free = idm_acceleration(&params, 0.0, params.target_velocity, None);
        let lead = LeadKinematics {
            net_distance: 5.0,
            velocity: 0.0,
        };
        let following = idm_acceleration(&params, 0.0, params.target_velocity, Some(&lead));
        assert!(following < free);
    }

    #[test]
    fn closing_in_brakes_harder_than_tracking() {
        let params = IdmParams::default();
        let closing = LeadKinematics {
            net_distance: 10.0,
            velocity: 0.0,
        };
        let tracking = LeadKinematics {
            net_distance: 10.0,
            velocity: 8.0,
        };
        let a_closing = idm_acceleration(&params, 8.0, params.target_velocity, Some(&closing));
        let a_tracking = idm_acceleration(&params, 8.0, params.target_velocity, Some(&tracking));
        assert!(a_closing < a_tracking);
    }

    #[test]
    fn tiny_gap_forces_hard_braking() {
        let params = IdmParams::default();
        let lead = LeadKinematics {
            net_distance: 0.01,
            velocity: 0.0,
        };
        let acc = idm_acceleration(&params, 5.0, params.target_velocity, Some(&lead));
        assert!(acc < -params.decel_max);
    }
}
