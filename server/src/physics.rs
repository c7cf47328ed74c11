//! Per-tick ball integration and contact detection.
//!
//! The court is centred on the origin. Paddles are vertical segments at
//! `x = ±paddle_x`, walls run along `y = ±half_court_height` and the goals lie
//! beyond `x = ±half_court_width`. Paddle contact is swept over the whole
//! step, so a fast ball cannot pass through a paddle face between two ticks.
//! Within one step contacts are checked in the order paddle, goal, wall; a
//! goal ends the step.

use crate::ball::BallSimulation;
use shared::{MatchConfig, Side, Vector2};

/// Upper bound for a single simulation step, in seconds.
pub const MAX_DELTA_TIME: f32 = 1.0 / 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contact {
    /// The ball left the court through this side's goal.
    Goal(Side),
    Paddle { side: Side, paddle_y: f32 },
    Wall,
}

///Static court geometry.
#[derive(Debug, Clone, Copy)]
pub struct Court {
    pub half_height: f32,
    pub half_width: f32,
    pub paddle_x: f32,
    pub paddle_height: f32,
    pub ball_radius: f32,
}

impl Court {
    pub fn from_config(config: &MatchConfig) -> Self {
        Self {
            half_height: config.half_court_height,
            half_width: config.half_court_width,
            paddle_x: config.paddle_x,
            paddle_height: config.paddle_height,
            ball_radius: config.ball_radius,
        }
    }

    /// Which goal, if any, `position` lies in.
    pub fn goal_at(&self, position: Vector2) -> Option<Side> {
        if position.x > self.half_width {
            Some(Side::Right)
        } else if position.x < -self.half_width {
            Some(Side::Left)
        } else {
            None
        }
    }

    /// Detects whether the ball, moving from `previous` to `current`, crossed
    /// the face of the paddle it is heading for. Returns that side, its
    /// paddle position and the ball centre at the moment of contact.
    fn paddle_contact(
        &self,
        previous: Vector2,
        current: Vector2,
        velocity: Vector2,
        left_y: f32,
        right_y: f32,
    ) -> Option<(Side, f32, Vector2)> {
        let r = self.ball_radius;
        let (side, paddle_y, face_x) = if velocity.x > 0.0 {
            (Side::Right, right_y, self.paddle_x - r)
        } else if velocity.x < 0.0 {
            (Side::Left, left_y, -self.paddle_x + r)
        } else {
            return None;
        };

        // In front of the face before the step, on or past it after.
        let heading = velocity.x.signum();
        if (face_x - previous.x) * heading < 0.0 || (face_x - current.x) * heading > 0.0 {
            return None;
        }

        let travelled = current.x - previous.x;
        let t = if travelled == 0.0 {
            1.0
        } else {
            (face_x - previous.x) / travelled
        };
        let y = previous.y + (current.y - previous.y) * t;
        if (y - paddle_y).abs() > self.paddle_height / 2.0 + r {
            return None;
        }
        Some((side, paddle_y, Vector2::new(face_x, y)))
    }

    fn wall_contact(&self, position: Vector2, velocity: Vector2) -> bool {
        let limit = self.half_height - self.ball_radius;
        (position.y >= limit && velocity.y > 0.0) || (position.y <= -limit && velocity.y < 0.0)
    }
}

/// Advances an active ball by `dt` seconds and resolves its contacts.
///
/// Paddle and wall contacts are applied to the ball directly; the returned
/// list reports everything that happened so the caller can arbitrate goals.
pub fn step(
    court: &Court,
    ball: &mut BallSimulation,
    left_paddle_y: f32,
    right_paddle_y: f32,
    dt: f32,
) -> Vec<Contact> {
    let mut contacts = Vec::new();
    if !ball.is_active() {
        return contacts;
    }

    let previous = ball.position();
    ball.advance(dt);
    let mut position = ball.position();

    let velocity = ball.velocity();
    if let Some((side, paddle_y, contact)) =
        court.paddle_contact(previous, position, velocity, left_paddle_y, right_paddle_y)
    {
        position = contact;
        ball.place(position);
        // Paddles only move vertically.
        let relative_velocity_x = 0.0 - velocity.x;
        ball.on_paddle_collision(
            position.y,
            paddle_y,
            court.paddle_height,
            relative_velocity_x,
        );
        contacts.push(Contact::Paddle { side, paddle_y });
    } else if let Some(side) = court.goal_at(position) {
        contacts.push(Contact::Goal(side));
        return contacts;
    }

    let velocity = ball.velocity();
    if court.wall_contact(position, velocity) {
        let limit = court.half_height - court.ball_radius;
        position.y = position.y.clamp(-limit, limit);
        ball.place(position);
        ball.on_wall_collision();
        contacts.push(Contact::Wall);
    }

    contacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use assert_approx_eq::assert_approx_eq;
    use shared::SpeedLevel;

    fn setup() -> (Court, BallSimulation, EventBus) {
        let config = MatchConfig::default();
        let bus = EventBus::new();
        let ball = BallSimulation::new(&config, bus.publisher()).unwrap();
        (Court::from_config(&config), ball, bus)
    }

    #[test]
    fn test_free_flight_has_no_contacts() {
        let (court, mut ball, _bus) = setup();
        ball.reset_for_new_rally(Vector2::new(1.0, 0.0));
        let contacts = step(&court, &mut ball, 0.0, 0.0, 0.1);
        assert!(contacts.is_empty());
        assert_approx_eq!(ball.position().x, 2.0, 1e-5);
    }

    #[test]
    fn test_right_paddle_returns_ball() {
        let (court, mut ball, _bus) = setup();
        ball.reset_for_new_rally(Vector2::new(1.0, 0.0));
        ball.place(Vector2::new(7.5, 0.2));

        let contacts = step(&court, &mut ball, 0.0, 0.0, 0.05);
        assert_eq!(
            contacts,
            vec![Contact::Paddle {
                side: Side::Right,
                paddle_y: 0.0
            }]
        );
        assert!(ball.velocity().x < 0.0);
        assert!(ball.velocity().y > 0.0);
        assert_eq!(ball.paddle_hit_count(), 1);
        assert_approx_eq!(ball.position().x, 7.75, 1e-5);
    }

    #[test]
    fn test_left_paddle_returns_ball() {
        let (court, mut ball, _bus) = setup();
        ball.reset_for_new_rally(Vector2::new(-1.0, 0.0));
        ball.place(Vector2::new(-7.5, -0.5));

        let contacts = step(&court, &mut ball, -0.2, 0.0, 0.05);
        assert_eq!(
            contacts,
            vec![Contact::Paddle {
                side: Side::Left,
                paddle_y: -0.2
            }]
        );
        assert!(ball.velocity().x > 0.0);
        assert!(ball.velocity().y < 0.0);
    }

    #[test]
    fn test_missed_paddle_leads_to_goal() {
        let (court, mut ball, _bus) = setup();
        ball.reset_for_new_rally(Vector2::new(1.0, 0.0));
        ball.place(Vector2::new(7.5, 0.0));

        // Paddle far away from the ball.
        let contacts = step(&court, &mut ball, 0.0, 4.0, 0.05);
        assert!(contacts.is_empty());

        let mut goal = None;
        for _ in 0..10 {
            if let Some(Contact::Goal(side)) = step(&court, &mut ball, 0.0, 4.0, 0.05).first() {
                goal = Some(*side);
                break;
            }
        }
        assert_eq!(goal, Some(Side::Right));
    }

    #[test]
    fn test_wall_bounce_keeps_speed() {
        let (court, mut ball, _bus) = setup();
        ball.reset_for_new_rally(Vector2::new(0.0, 1.0));
        ball.place(Vector2::new(0.0, 4.1));

        let contacts = step(&court, &mut ball, 0.0, 0.0, 0.05);
        assert_eq!(contacts, vec![Contact::Wall]);
        assert!(ball.velocity().y < 0.0);
        assert_approx_eq!(ball.velocity().magnitude(), 20.0, 1e-4);
        assert_approx_eq!(ball.position().y, 4.25, 1e-5);
        assert_eq!(ball.speed_level(), SpeedLevel::Slow);
    }

    #[test]
    fn test_hidden_ball_is_not_simulated() {
        let (court, mut ball, _bus) = setup();
        ball.reset_for_new_rally(Vector2::new(1.0, 0.0));
        ball.set_active(false);
        assert!(step(&court, &mut ball, 0.0, 0.0, 10.0).is_empty());
        assert_eq!(ball.position(), Vector2::ZERO);
    }

    /// Serves along `direction` after `hits` paddle contacts.
    fn promote(ball: &mut BallSimulation, hits: u32, direction: Vector2) {
        ball.reset_for_new_rally(direction);
        for _ in 0..hits {
            ball.on_paddle_collision(0.0, 0.0, 1.5, direction.x);
        }
        ball.launch(direction);
    }

    #[test]
    fn test_fast_ball_cannot_pass_through_paddle() {
        let (court, mut ball, _bus) = setup();
        promote(&mut ball, 12, Vector2::new(1.0, 0.0));
        assert_eq!(ball.speed_level(), SpeedLevel::Fast);
        ball.place(Vector2::new(7.6, 0.0));

        // Without the sweep this step would end at x = 9.6, inside the goal.
        let contacts = step(&court, &mut ball, 0.0, 0.0, MAX_DELTA_TIME);
        assert_eq!(
            contacts,
            vec![Contact::Paddle {
                side: Side::Right,
                paddle_y: 0.0
            }]
        );
        assert_approx_eq!(ball.position().x, 7.75, 1e-5);
        assert!(ball.velocity().x < 0.0);
        assert_approx_eq!(ball.velocity().magnitude(), 40.0, 1e-3);
    }

    #[test]
    fn test_medium_and_fast_balls_hit_both_paddles_at_max_step() {
        for (hits, level) in [(4, SpeedLevel::Medium), (12, SpeedLevel::Fast)] {
            for side in [Side::Left, Side::Right] {
                let (court, mut ball, _bus) = setup();
                let direction = side.direction();
                promote(&mut ball, hits, direction);
                assert_eq!(ball.speed_level(), level);
                ball.place(Vector2::new(7.2 * direction.x, 0.3));

                let contacts = step(&court, &mut ball, 0.0, 0.0, MAX_DELTA_TIME);
                assert_eq!(
                    contacts,
                    vec![Contact::Paddle {
                        side,
                        paddle_y: 0.0
                    }],
                    "{:?} ball towards {:?}",
                    level,
                    side
                );
                assert_approx_eq!(ball.position().x, 7.75 * direction.x, 1e-5);
                assert_approx_eq!(ball.position().y, 0.3, 1e-5);
                assert!(ball.velocity().x * direction.x < 0.0);
            }
        }
    }

    #[test]
    fn test_fast_ball_past_paddle_scores() {
        let (court, mut ball, _bus) = setup();
        promote(&mut ball, 12, Vector2::new(-1.0, 0.0));
        ball.place(Vector2::new(-7.6, 0.0));

        let contacts = step(&court, &mut ball, 4.0, 0.0, MAX_DELTA_TIME);
        assert_eq!(contacts, vec![Contact::Goal(Side::Left)]);
    }

    #[test]
    fn test_paddle_contact_uses_crossing_point() {
        let (court, mut ball, _bus) = setup();
        promote(&mut ball, 12, Vector2::new(1.0, 1.0));
        ball.place(Vector2::new(7.0, 0.0));

        // The step ends about 1.41 above the paddle, out of reach, but the
        // ball crossed the face at y = 0.75.
        let contacts = step(&court, &mut ball, 0.0, 0.0, MAX_DELTA_TIME);
        assert_eq!(
            contacts,
            vec![Contact::Paddle {
                side: Side::Right,
                paddle_y: 0.0
            }]
        );
        assert_approx_eq!(ball.position().x, 7.75, 1e-5);
        assert_approx_eq!(ball.position().y, 0.75, 1e-4);
    }

    #[test]
    fn test_goal_sides() {
        let (court, _ball, _bus) = setup();
        assert_eq!(court.goal_at(Vector2::new(9.5, 0.0)), Some(Side::Right));
        assert_eq!(court.goal_at(Vector2::new(-9.5, 0.0)), Some(Side::Left));
        assert_eq!(court.goal_at(Vector2::new(8.9, 0.0)), None);
    }
}
