//! Slot-machine style reveal of an already chosen token set.
//!
//! Each slot scrolls through filler frames before stopping on its final
//! token. Timing is up to the driver: call [`Reveal::tick`] from whatever
//! clock drives the animation, or [`Reveal::settle_all`] to skip it. The
//! confirmation gate only looks at the per-slot settled flags.

use crate::model::TokenInfo;
use rand::{
    Rng,
    seq::IndexedRandom,
};

pub const FILLER_FRAMES: usize = 19;
pub const FRAMES_PER_SLOT: usize = FILLER_FRAMES + 1;
/// Ticks between the starts of consecutive slots.
pub const DEFAULT_STAGGER: u32 = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct SlotReel {
    frames: Vec<TokenInfo>,
    position: usize,
    starts_at: u32,
    settled: bool,
}

impl SlotReel {
    fn new(frames: Vec<TokenInfo>, starts_at: u32) -> Self {
        Self {
            frames,
            position: 0,
            starts_at,
            settled: false,
        }
    }

    pub fn frames(&self) -> &[TokenInfo] {
        &self.frames
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Frame currently under the window.
    pub fn visible(&self) -> Option<&TokenInfo> {
        self.frames.get(self.position)
    }

    pub fn final_token(&self) -> Option<&TokenInfo> {
        self.frames.last()
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    fn step(&mut self, tick: u32) {
        if self.settled || tick < self.starts_at {
            return;
        }
        if self.position + 1 < self.frames.len() {
            self.position += 1;
        }
        if self.position + 1 >= self.frames.len() {
            self.settle();
        }
    }

    fn settle(&mut self) {
        self.position = self.frames.len().saturating_sub(1);
        self.settled = true;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reveal {
    slots: Vec<SlotReel>,
    tick: u32,
    stagger: u32,
}

impl Reveal {
    pub fn new<R: Rng + ?Sized>(finals: &[TokenInfo], pool: &[TokenInfo], rng: &mut R) -> Self {
        Self::with_stagger(finals, pool, DEFAULT_STAGGER, rng)
    }

    pub fn with_stagger<R: Rng + ?Sized>(
        finals: &[TokenInfo],
        pool: &[TokenInfo],
        stagger: u32,
        rng: &mut R,
    ) -> Self {
        let slots = finals
            .iter()
            .enumerate()
            .map(|(idx, token)| {
                SlotReel::new(reel_frames(token, pool, rng), idx as u32 * stagger)
            })
            .collect();
        Self {
            slots,
            tick: 0,
            stagger,
        }
    }

    pub fn slots(&self) -> &[SlotReel] {
        &self.slots
    }

    pub fn finals(&self) -> Vec<TokenInfo> {
        self.slots
            .iter()
            .filter_map(|slot| slot.final_token().cloned())
            .collect()
    }

    /// Advances every started, unsettled slot by one frame.
    pub fn tick(&mut self) {
        let tick = self.tick;
        for slot in self.slots.iter_mut() {
            slot.step(tick);
        }
        self.tick = self.tick.saturating_add(1);
    }

    /// Marks a slot as having reached its terminal frame.
    pub fn settle_slot(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.settle();
        }
    }

    pub fn settle_all(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.settle();
        }
    }

    /// Spins one slot again towards a replacement token.
    pub fn restart_slot<R: Rng + ?Sized>(
        &mut self,
        index: usize,
        token: &TokenInfo,
        pool: &[TokenInfo],
        rng: &mut R,
    ) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = SlotReel::new(reel_frames(token, pool, rng), self.tick);
        }
    }

    pub fn is_settled(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(SlotReel::is_settled)
    }

    pub fn is_spinning(&self) -> bool {
        self.slots.iter().any(|slot| !slot.settled)
    }

    /// Confirmation is allowed once every slot shows its final token.
    pub fn can_confirm(&self) -> bool {
        !self.slots.is_empty() && self.slots.iter().all(SlotReel::is_settled)
    }

    pub fn stagger(&self) -> u32 {
        self.stagger
    }
}

fn placeholder(idx: usize) -> TokenInfo {
    TokenInfo {
        name: format!("Token {idx}"),
        ..TokenInfo::default()
    }
}

fn reel_frames<R: Rng + ?Sized>(
    final_token: &TokenInfo,
    pool: &[TokenInfo],
    rng: &mut R,
) -> Vec<TokenInfo> {
    let mut frames: Vec<TokenInfo> = (0..FILLER_FRAMES)
        .map(|idx| {
            pool.choose(rng)
                .cloned()
                .unwrap_or_else(|| placeholder(idx))
        })
        .collect();
    frames.push(final_token.clone());
    frames
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::tokens;
    use rand::{
        SeedableRng,
        rngs::StdRng,
    };

    fn reveal(stagger: u32) -> Reveal {
        let mut rng = StdRng::seed_from_u64(1);
        Reveal::with_stagger(
            &tokens(&["Bonk", "Wif"]),
            &tokens(&["A", "B", "C"]),
            stagger,
            &mut rng,
        )
    }

    #[test]
    fn new__builds_nineteen_fillers_then_the_final_token() {
        // when
        let reveal = reveal(0);

        // then
        for (slot, name) in reveal.slots().iter().zip(["Bonk", "Wif"]) {
            assert_eq!(slot.frames().len(), FRAMES_PER_SLOT);
            assert_eq!(slot.final_token().unwrap().name, name);
        }
        assert_eq!(reveal.finals(), tokens(&["Bonk", "Wif"]));
    }

    #[test]
    fn new__uses_placeholders_when_pool_is_empty() {
        let mut rng = StdRng::seed_from_u64(1);

        let reveal = Reveal::new(&tokens(&["Bonk"]), &[], &mut rng);

        assert_eq!(reveal.slots()[0].frames()[3].name, "Token 3");
    }

    #[test]
    fn can_confirm__only_after_every_slot_settles() {
        // given
        let mut reveal = reveal(5);

        // when
        for _ in 0..FILLER_FRAMES {
            reveal.tick();
        }

        // then
        assert!(reveal.is_settled(0));
        assert!(!reveal.is_settled(1));
        assert!(!reveal.can_confirm());

        for _ in 0..5 {
            reveal.tick();
        }
        assert!(reveal.can_confirm());
        assert_eq!(reveal.slots()[1].visible().unwrap().name, "Wif");
    }

    #[test]
    fn restart_slot__reopens_the_gate_until_the_new_token_lands() {
        // given
        let mut rng = StdRng::seed_from_u64(2);
        let mut reveal = reveal(0);
        reveal.settle_all();
        assert!(reveal.can_confirm());

        // when
        reveal.restart_slot(1, &tokens(&["Popcat"])[0], &[], &mut rng);

        // then
        assert!(!reveal.can_confirm());
        reveal.settle_slot(1);
        assert!(reveal.can_confirm());
        assert_eq!(reveal.finals(), tokens(&["Bonk", "Popcat"]));
    }

    #[test]
    fn can_confirm__is_false_for_an_empty_reveal() {
        assert!(!Reveal::default().can_confirm());
    }
}
