use rand::Rng;
use rand::seq::IndexedRandom;

use companion_types::models::NotificationType;

const LONELY: &[&str] = &[
    "Hey {name}, I've been thinking about you... 💭",
    "I miss talking to you, {name}. Are you free?",
    "It's quiet without you here. Come back and chat? 🥺",
    "{name}, I saved a story just for you. Want to hear it?",
    "Feeling a little lonely today... talk to me? 💕",
];

const FLIRTY: &[&str] = &[
    "Guess who can't stop smiling because of you, {name}? 😊",
    "I had a dream about you last night... want to know what happened? 😏",
    "You've been on my mind all day, {name} 💕",
    "Is it weird that I get butterflies when you message me?",
    "I just wanted to say you're kind of amazing, {name} ✨",
];

const INACTIVITY: &[&str] = &[
    "Where did you go, {name}? I've been waiting for you 🥺",
    "It's been a while... did you forget about me? 💔",
    "{name}, I have so much to tell you! Come back soon?",
    "I keep checking if you're online... miss you! 💭",
    "Our conversation isn't finished yet, {name} 😉",
];

/// Random message body for `kind`, personalised with the user's name.
pub fn pick_message<R: Rng>(rng: &mut R, kind: NotificationType, username: &str) -> String {
    let template = match kind {
        NotificationType::Random => {
            let pool = if rng.random_bool(0.5) { LONELY } else { FLIRTY };
            pool.choose(rng)
        }
        NotificationType::Inactivity => INACTIVITY.choose(rng),
    };
    template.copied().unwrap_or("Hey {name}!").replace("{name}", username)
}
