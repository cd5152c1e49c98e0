//! Progressive accumulation state
//!
//! Two surfaces are used in ping-pong fashion. At frame index `i` the path
//! tracer writes surface `i % 2` while reading the running average from
//! surface `(i + 1) % 2`, so a frame never samples the surface it writes.
//!
//! Resetting only rewinds the frame index. Surface contents are left alone:
//! at frame 0 the path tracer writes its sample as-is and never reads the
//! previous surface, so stale or non-finite values cannot leak through.

/// One of the two accumulation surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceSlot {
    A = 0,
    B = 1,
}

impl SurfaceSlot {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn other(self) -> Self {
        match self {
            SurfaceSlot::A => SurfaceSlot::B,
            SurfaceSlot::B => SurfaceSlot::A,
        }
    }

    /// Write target for a frame index
    pub fn target_for(frame_index: u32) -> Self {
        if frame_index % 2 == 0 {
            SurfaceSlot::A
        } else {
            SurfaceSlot::B
        }
    }

    /// Read source (previous running average) for a frame index
    pub fn source_for(frame_index: u32) -> Self {
        Self::target_for(frame_index).other()
    }
}

/// Write target and read source selected for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong {
    pub target: SurfaceSlot,
    pub source: SurfaceSlot,
}

impl PingPong {
    pub fn for_frame(frame_index: u32) -> Self {
        Self {
            target: SurfaceSlot::target_for(frame_index),
            source: SurfaceSlot::source_for(frame_index),
        }
    }
}

/// Frame counters for progressive refinement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accumulation {
    frame_index: u32,
    total_frames: u64,
    resets: u64,
}

impl Accumulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames blended into the current running average
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Frames rendered since startup, never reset
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn ping_pong(&self) -> PingPong {
        PingPong::for_frame(self.frame_index)
    }

    /// Restart the running average from frame zero.
    pub fn reset(&mut self) {
        self.frame_index = 0;
        self.resets += 1;
    }

    pub fn advance(&mut self) {
        self.frame_index = self.frame_index.wrapping_add(1);
        self.total_frames += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_pong_never_aliases() {
        for i in 0..1000u32 {
            let frame = PingPong::for_frame(i);
            assert_ne!(frame.target, frame.source);
            assert_eq!(frame.target, PingPong::for_frame(i + 1).source);
        }
        let last = PingPong::for_frame(u32::MAX);
        assert_ne!(last.target, last.source);
    }

    #[test]
    fn test_advance_and_reset() {
        let mut acc = Accumulation::new();
        acc.advance();
        acc.advance();
        acc.advance();
        assert_eq!(acc.frame_index(), 3);

        acc.reset();
        assert_eq!(acc.frame_index(), 0);
        assert_eq!(acc.total_frames(), 3);
        assert_eq!(acc.resets(), 1);
        assert_eq!(acc.ping_pong().target, SurfaceSlot::A);
    }
}
