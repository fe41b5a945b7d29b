use netmelee::StateHasher;

pub const INPUT_LEFT: u8 = 1 << 0;
pub const INPUT_RIGHT: u8 = 1 << 1;
pub const INPUT_THRUST: u8 = 1 << 2;
pub const INPUT_WEAPON: u8 = 1 << 3;

/// Side length of the (wrapping) arena in world units.
const ARENA_SIZE: i32 = 1 << 14;
const HEADINGS: u8 = 16;
/// sin(k * 22.5deg) * 64
const SINE: [i32; 16] = [0, 24, 45, 59, 64, 59, 45, 24, 0, -24, -45, -59, -64, -59, -45, -24];

fn sin(heading: u8) -> i32 {
    SINE[usize::from(heading % HEADINGS)]
}

fn cos(heading: u8) -> i32 {
    SINE[usize::from((heading + 4) % HEADINGS)]
}

/// Shortest signed distance between two coordinates on the wrapping axis.
fn wrap_delta(from: i32, to: i32) -> i32 {
    let d = (to - from).rem_euclid(ARENA_SIZE);
    if d > ARENA_SIZE / 2 { d - ARENA_SIZE } else { d }
}

/// Linear congruential generator. Both peers seed it identically, so it must
/// stay bit-for-bit stable.
#[derive(Debug, Clone)]
pub struct Rng {
    state: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.state >> 8
    }

    pub fn below(&mut self, n: u32) -> u32 {
        self.next_u32() % n.max(1)
    }

    pub fn state(&self) -> u32 {
        self.state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipClass {
    pub max_speed: i32,
    pub thrust: i32,
    pub crew: i16,
    pub weapon_range: i32,
    pub weapon_wait: u8,
    pub turn_wait: u8,
}

impl ShipClass {
    pub fn for_type(ship: u8) -> Self {
        let t = i32::from(ship);
        Self {
            max_speed: 96 + (t % 4) * 24,
            thrust: 8 + (t % 3) * 4,
            crew: 10 + i16::from(ship % 5) * 2,
            weapon_range: 1800 + (t % 6) * 200,
            weapon_wait: 4 + ship % 4,
            turn_wait: 1 + ship % 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ship {
    pub class: ShipClass,
    pub x: i32,
    pub y: i32,
    pub vx: i32,
    pub vy: i32,
    pub heading: u8,
    pub crew: i16,
    weapon_cooldown: u8,
    turn_cooldown: u8,
}

impl Ship {
    fn spawn(ship_type: u8, rng: &mut Rng) -> Self {
        let class = ShipClass::for_type(ship_type);
        Self {
            class,
            x: rng.below(ARENA_SIZE as u32) as i32,
            y: rng.below(ARENA_SIZE as u32) as i32,
            vx: 0,
            vy: 0,
            heading: rng.below(u32::from(HEADINGS)) as u8,
            crew: class.crew,
            weapon_cooldown: 0,
            turn_cooldown: 0,
        }
    }

    pub fn alive(&self) -> bool {
        self.crew > 0
    }

    fn steer(&mut self, input: u8) {
        if self.turn_cooldown > 0 {
            self.turn_cooldown -= 1;
        } else if input & INPUT_LEFT != 0 {
            self.heading = (self.heading + HEADINGS - 1) % HEADINGS;
            self.turn_cooldown = self.class.turn_wait;
        } else if input & INPUT_RIGHT != 0 {
            self.heading = (self.heading + 1) % HEADINGS;
            self.turn_cooldown = self.class.turn_wait;
        }

        if input & INPUT_THRUST != 0 {
            self.vx += self.class.thrust * cos(self.heading) / 64;
            self.vy += self.class.thrust * sin(self.heading) / 64;
            let speed_sq = i64::from(self.vx).pow(2) + i64::from(self.vy).pow(2);
            let max = i64::from(self.class.max_speed);
            if speed_sq > max * max {
                let speed = (speed_sq as u64).isqrt() as i64;
                self.vx = (i64::from(self.vx) * max / speed) as i32;
                self.vy = (i64::from(self.vy) * max / speed) as i32;
            }
        }

        self.x = (self.x + self.vx).rem_euclid(ARENA_SIZE);
        self.y = (self.y + self.vy).rem_euclid(ARENA_SIZE);
    }

    fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.write_i32(self.x);
        hasher.write_i32(self.y);
        hasher.write_i32(self.vx);
        hasher.write_i32(self.vy);
        hasher.write_u8(self.heading);
        hasher.write_u16(self.crew as u16);
        hasher.write_u8(self.weapon_cooldown);
        hasher.write_u8(self.turn_cooldown);
    }
}

/// Deterministic two-ship battle. Given the same seed, ship types and input
/// sequence, every peer computes the same state and checksums.
#[derive(Debug, Clone)]
pub struct Arena {
    ships: [Ship; 2],
    rng: Rng,
    frame: u32,
    max_frames: u32,
}

impl Arena {
    pub fn new(seed: u32, ship_types: [u8; 2], max_frames: u32) -> Self {
        let mut rng = Rng::new(seed);
        let first = Ship::spawn(ship_types[0], &mut rng);
        let second = Ship::spawn(ship_types[1], &mut rng);
        Self {
            ships: [first, second],
            rng,
            frame: 0,
            max_frames,
        }
    }

    pub fn ship(&self, player: usize) -> &Ship {
        &self.ships[player]
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Squared wrapped distance between the two ships.
    pub fn distance_sq(&self) -> i64 {
        let [a, b] = &self.ships;
        let dx = i64::from(wrap_delta(a.x, b.x));
        let dy = i64::from(wrap_delta(a.y, b.y));
        dx * dx + dy * dy
    }

    /// Advances one frame. `inputs` is indexed by player number.
    pub fn step(&mut self, inputs: [u8; 2]) {
        for (ship, input) in self.ships.iter_mut().zip(inputs) {
            if ship.alive() {
                ship.steer(input);
            }
        }

        let distance_sq = self.distance_sq();
        for player in 0..2 {
            let shooter = &mut self.ships[player];
            if shooter.weapon_cooldown > 0 {
                shooter.weapon_cooldown -= 1;
                continue;
            }
            if !shooter.alive() || inputs[player] & INPUT_WEAPON == 0 {
                continue;
            }
            shooter.weapon_cooldown = shooter.class.weapon_wait;
            let range = i64::from(shooter.class.weapon_range);
            if distance_sq <= range * range && self.rng.below(4) != 0 {
                let target = &mut self.ships[1 - player];
                target.crew = (target.crew - 1).max(0);
            }
        }

        self.frame = self.frame.wrapping_add(1);
    }

    pub fn finished(&self) -> bool {
        self.frame >= self.max_frames || self.ships.iter().any(|s| !s.alive())
    }

    /// The surviving player, or `None` for a draw.
    pub fn winner(&self) -> Option<usize> {
        match (self.ships[0].alive(), self.ships[1].alive()) {
            (true, false) => Some(0),
            (false, true) => Some(1),
            (true, true) => match self.ships[0].crew.cmp(&self.ships[1].crew) {
                std::cmp::Ordering::Greater => Some(0),
                std::cmp::Ordering::Less => Some(1),
                std::cmp::Ordering::Equal => None,
            },
            (false, false) => None,
        }
    }

    pub fn checksum(&self) -> u32 {
        let mut hasher = StateHasher::new();
        hasher.write_u32(self.frame);
        hasher.write_u32(self.rng.state());
        for ship in &self.ships {
            ship.hash_into(&mut hasher);
        }
        hasher.finish()
    }
}

/// Computer pilot producing the local player's input each frame.
#[derive(Debug, Clone)]
pub struct Pilot {
    player: usize,
    rng: Rng,
}

impl Pilot {
    pub fn new(player: usize, seed: u32) -> Self {
        Self {
            player,
            rng: Rng::new(seed ^ (player as u32).wrapping_mul(0x9E37_79B9)),
        }
    }

    pub fn next_input(&mut self, arena: &Arena) -> u8 {
        let me = arena.ship(self.player);
        let them = arena.ship(1 - self.player);
        let dx = wrap_delta(me.x, them.x);
        let dy = wrap_delta(me.y, them.y);

        let wanted = (0..HEADINGS)
            .max_by_key(|&h| dx * cos(h) + dy * sin(h))
            .unwrap_or(me.heading);
        let turn = (wanted + HEADINGS - me.heading) % HEADINGS;

        let mut input = 0;
        match turn {
            0 => {}
            t if t < HEADINGS / 2 => input |= INPUT_RIGHT,
            _ => input |= INPUT_LEFT,
        }
        if self.rng.below(3) != 0 {
            input |= INPUT_THRUST;
        }
        let range = i64::from(me.class.weapon_range);
        if arena.distance_sq() <= range * range || self.rng.below(16) == 0 {
            input |= INPUT_WEAPON;
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(seed: u32, frames: u32) -> Arena {
        let mut arena = Arena::new(seed, [3, 7], 10_000);
        let mut pilots = [Pilot::new(0, 11), Pilot::new(1, 22)];
        for _ in 0..frames {
            let inputs = [pilots[0].next_input(&arena), pilots[1].next_input(&arena)];
            arena.step(inputs);
        }
        arena
    }

    #[test]
    fn test_same_inputs_same_checksum() {
        let a = run(42, 200);
        let b = run(42, 200);
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.frame(), 200);
    }

    #[test]
    fn test_diverging_input_changes_checksum() {
        let mut a = Arena::new(42, [3, 7], 100);
        let mut b = a.clone();
        a.step([INPUT_THRUST, 0]);
        b.step([0, 0]);
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_seed_changes_spawn() {
        let a = Arena::new(1, [0, 0], 10);
        let b = Arena::new(2, [0, 0], 10);
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_battle_ends_at_frame_limit() {
        let mut arena = Arena::new(7, [0, 0], 5);
        for _ in 0..5 {
            assert!(!arena.finished());
            arena.step([0, 0]);
        }
        assert!(arena.finished());
        assert_eq!(arena.winner(), None);
    }

    #[test]
    fn test_wrap_delta_takes_short_way() {
        assert_eq!(wrap_delta(10, ARENA_SIZE - 10), -20);
        assert_eq!(wrap_delta(ARENA_SIZE - 10, 10), 20);
        assert_eq!(wrap_delta(0, 100), 100);
    }
}
