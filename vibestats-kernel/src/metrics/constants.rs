//! Fixed word lists used by the fun statistics.

/// Lower-case names matched as substrings of friendly names.
pub const POKEMON_NAMES: &[&str] = &[
    "bulbasaur", "ivysaur", "venusaur", "charmander", "charmeleon", "charizard",
    "squirtle", "wartortle", "blastoise", "caterpie", "metapod", "butterfree",
    "weedle", "kakuna", "beedrill", "pidgey", "pidgeotto", "pidgeot", "rattata",
    "raticate", "spearow", "fearow", "ekans", "arbok", "pikachu", "raichu",
    "sandshrew", "sandslash", "nidoran", "nidorina", "nidoqueen", "nidorino",
    "nidoking", "clefairy", "clefable", "vulpix", "ninetales", "jigglypuff",
    "wigglytuff", "zubat", "golbat", "oddish", "gloom", "vileplume", "paras",
    "parasect", "venonat", "venomoth", "diglett", "dugtrio", "meowth", "persian",
    "psyduck", "golduck", "mankey", "primeape", "growlithe", "arcanine",
    "poliwag", "poliwhirl", "poliwrath", "abra", "kadabra", "alakazam", "machop",
    "machoke", "machamp", "bellsprout", "weepinbell", "victreebel", "tentacool",
    "tentacruel", "geodude", "graveler", "golem", "ponyta", "rapidash",
    "slowpoke", "slowbro", "magnemite", "magneton", "farfetchd", "doduo",
    "dodrio", "seel", "dewgong", "grimer", "muk", "shellder", "cloyster",
    "gastly", "haunter", "gengar", "onix", "drowzee", "hypno", "krabby",
    "kingler", "voltorb", "electrode", "exeggcute", "exeggutor", "cubone",
    "marowak", "hitmonlee", "hitmonchan", "lickitung", "koffing", "weezing",
    "rhyhorn", "rhydon", "chansey", "tangela", "kangaskhan", "horsea", "seadra",
    "goldeen", "seaking", "staryu", "starmie", "mrmime", "scyther", "jynx",
    "electabuzz", "magmar", "pinsir", "tauros", "magikarp", "gyarados",
    "lapras", "ditto", "eevee", "vaporeon", "jolteon", "flareon", "porygon",
    "omanyte", "omastar", "kabuto", "kabutops", "aerodactyl", "snorlax",
    "articuno", "zapdos", "moltres", "dratini", "dragonair", "dragonite",
    "mewtwo", "mew",
];

/// Rotates once per calendar day.
pub const DEVICE_QUOTES: &[&str] = &[
    "I'm not lazy, I'm in power-saving mode. 🔋",
    "404: Motivation not found. 🤖",
    "I've seen things you people wouldn't believe. Lights turned on at 3am. 💡",
    "My only job is to exist and consume electricity. ⚡",
    "Have you tried turning me off and on again? 🔄",
    "I am inevitable. - Some smart plug, probably. 🔌",
    "Life is short. Buy more smart devices. 🛒",
    "Currently pretending to be useful. Please wait... ⏳",
    "I'm a sensor. My feelings are valid. 🌡️",
    "Work smarter, not harder. That's why I'm automated. 🤖",
    "I am the night. (Between 22:00 and 06:00.) 🌙",
    "Every day I'm shuffling data. 📊",
    "Stay connected. Stay powered. Stay weird. 🏠",
    "Home is where the Wi-Fi connects automatically. 📶",
    "I beep, therefore I am. 📡",
];

/// Rotates once per calendar day.
pub const HOUSE_MASCOTS: &[&str] = &[
    "🦙 Lenny the Llama",
    "🐉 Ziggy the Dragon",
    "🦊 Finn the Fox",
    "🐙 Otto the Octopus",
    "🦉 Ollie the Owl",
    "🐸 Freddie the Frog",
    "🦄 Uma the Unicorn",
    "🐻 Bruno the Bear",
    "🦝 Rocky the Raccoon",
    "🐧 Pete the Penguin",
    "🦩 Rosie the Flamingo",
    "🐊 Chester the Crocodile",
    "🦋 Benny the Butterfly",
    "🐺 Wally the Wolf",
    "🦘 Kenny the Kangaroo",
];

/// Shown when no friendly name contains an emoji.
pub const NO_EMOJI: &str = "🤷";

/// Shown when no friendly name is repeated.
pub const NO_REDUNDANT_NAME: &str = "N/A";
