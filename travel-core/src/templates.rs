//! Canned persona responses used whenever the model is slow, silent or failing.

use crate::agents::AgentId;

/// Returned by the synthesizer when no persona produced any text.
pub const EMPTY_SYNTHESIS: &str =
    "I'm ready to help with your travel planning. Please share your question!";

const DESTINATIONS: &[&str] = &[
    "tokyo", "japan", "paris", "rome", "london", "new york", "bangkok", "singapore", "dubai",
    "australia", "germany", "italy", "france", "spain", "thailand", "india", "china", "korea",
    "vietnam", "malaysia", "indonesia", "philippines", "chennai", "mumbai", "delhi", "bangalore",
    "hyderabad", "kolkata", "goa", "kerala", "rajasthan",
];
const FOOD: &[&str] = &[
    "food", "eat", "restaurant", "dining", "cuisine", "meal", "breakfast", "lunch", "dinner",
];
const ACCOMMODATION: &[&str] = &["hotel", "stay", "accommodation", "booking", "room", "resort"];
const BUDGET: &[&str] = &[
    "budget", "cost", "price", "money", "cheap", "expensive", "affordable",
];
const CULTURE: &[&str] = &[
    "culture", "cultural", "tradition", "temple", "museum", "history", "heritage",
];
const ANXIETY: &[&str] = &["nervous", "anxious", "worried", "scared", "overwhelmed", "stress"];

/// Coarse topic flags for a query, by substring match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryTraits {
    pub destination: bool,
    pub food: bool,
    pub accommodation: bool,
    pub budget: bool,
    pub cultural: bool,
    pub anxiety: bool,
}

impl QueryTraits {
    pub fn detect(query: &str) -> Self {
        let q = query.to_lowercase();
        let any = |words: &[&str]| words.iter().any(|w| q.contains(w));
        Self {
            destination: any(DESTINATIONS),
            food: any(FOOD),
            accommodation: any(ACCOMMODATION),
            budget: any(BUDGET),
            cultural: any(CULTURE),
            anxiety: any(ANXIETY),
        }
    }
}

/// Full markdown response for `agent`, chosen from the query's traits.
pub fn fallback_response(agent: AgentId, query: &str) -> String {
    let traits = QueryTraits::detect(query);
    let lowered = query.to_lowercase();

    match agent {
        AgentId::TextTripAnalyzer => {
            if traits.destination && lowered.contains("tokyo") {
                TOKYO_PLAN.to_string()
            } else if traits.destination && (lowered.contains("chennai") || lowered.contains("india"))
            {
                CHENNAI_PLAN.to_string()
            } else if traits.food {
                food_strategy(query)
            } else {
                trip_analysis(query)
            }
        }
        AgentId::TripMoodDetector => {
            if traits.anxiety {
                anxiety_support(query)
            } else {
                mood_assessment(query)
            }
        }
        AgentId::TripCommsCoach => communication_guide(query),
        AgentId::TripBehaviorGuide => decision_framework(query),
        AgentId::TripCalmPractice => stress_relief(query),
        AgentId::TripSummarySynth => planning_roadmap(query),
    }
}

/// Apology used when a persona could not produce anything at all.
pub fn unavailable_response(agent: AgentId, query: &str) -> String {
    format!(
        "I apologize, but {} is temporarily unavailable. However, I can still help with your travel query: '{}'. Please let me know how I can assist you!",
        agent, query
    )
}

// ============================================================================
// Template bodies
// ============================================================================

const TOKYO_PLAN: &str = "🎆 **Tokyo Trip Plan**

**🗺️ 7-Day Culture & Technology Itinerary:**
• **Days 1-2**: Traditional Tokyo - Asakusa (Sensoji Temple), Ueno Park, Imperial Palace
• **Days 3-4**: Modern Tokyo - Shibuya, Harajuku, Akihabara
• **Days 5-6**: Meiji Shrine, a tea ceremony, one night in a ryokan
• **Day 7**: Day trip to Mount Fuji or Nikko

**🍣 Must-Experience:**
• A traditional kaiseki dinner
• TeamLab digital art museum
• Tsukiji Outer Market food tour

**💰 Budget Framework:**
• Accommodation: $150-300/night (business hotels plus one ryokan)
• Food: $50-100/day
• Transport: JR Pass around $280
• Activities: $50-150/day

**Total estimated: $2,000-3,500 for 7 days**";

const CHENNAI_PLAN: &str = "🌴 **Chennai Travel Plan**

**🏛️ Cultural Highlights:**
• **Marina Beach** - one of the longest urban beaches in the world
• **Kapaleeshwarar Temple** - Dravidian architecture
• **Fort St. George** - colonial-era history
• **San Thome Basilica** - Portuguese-era church

**🍛 Culinary Must-Tries:**
• Filter coffee
• Chettinad cuisine
• Dosa and idli at a traditional breakfast spot

**🌤️ Best Time to Visit:** November to February

**💰 Budget Tips:**
• Local trains and buses are very affordable
• Many temples and cultural sites are free
• Stay near T. Nagar or Anna Nagar";

fn food_strategy(query: &str) -> String {
    format!(
        "🍝 **Culinary Travel Planning**

For your food-focused travel query: \"{query}\"

**🍽️ Food Travel Strategy:**
• **Research local specialties** before you go
• **Book a food tour** for authentic experiences
• **Learn basic food phrases** in the local language
• **Try street food safely** - pick busy stalls

**🌍 Universal Food Tips:**
• Start mild and work your way up to spicy dishes
• Ask locals for their favorite spots
• Keep a translation app handy for menus

Great food makes any trip unforgettable!"
    )
}

fn trip_analysis(query: &str) -> String {
    format!(
        "🔍 **Smart Trip Analysis**

Analyzing your travel query: \"{query}\"

**🎯 Planning Framework:**
• **Destination Research:** climate, culture and key attractions
• **Budget Planning:** realistic cost breakdown and savings tips
• **Timing Optimization:** best seasons and booking windows
• **Itinerary Design:** a mix of must-sees and free exploration

**📊 Next Steps:**
1. Define your core priorities (relaxation, adventure or culture)
2. Set a realistic budget range
3. Choose travel dates
4. Shortlist destinations that match your interests

What aspect would you like me to dive deeper into?"
    )
}

fn anxiety_support(query: &str) -> String {
    format!(
        "🤗 **Travel Anxiety Support**

I can sense some nervousness in: \"{query}\". This is completely normal!

**🌱 Understanding Your Feelings:**
• Pre-trip anxiety is very common
• Excitement and nervousness often arrive together
• Uncertainty about the unknown is a natural response

**💪 Building Confidence:**
• **Over-prepare the basics:** research reduces uncertainty
• **Start small:** short trips build experience
• **Visualize success:** picture the best moments of the trip

**🧘 Immediate Calm:**
• Breathe in for 4, hold for 4, out for 6
• Grounding: name 5 things you see, 4 you hear, 3 you can touch

Every experienced traveler started with a first nervous trip!"
    )
}

fn mood_assessment(query: &str) -> String {
    format!(
        "😊 **Travel Mood Assessment**

Reading the emotions in: \"{query}\"

**🌈 Travel Emotions Are Complex:**
• **Excitement** fuels adventure and discovery
• **Nervousness** shows you care about the experience
• **Anticipation** makes planning enjoyable

**🎢 Emotional Preparation Tips:**
• Channel excitement into productive planning
• Address concerns with practical research
• Share the plan with friends and family

Your emotional investment shows this trip will be meaningful!"
    )
}

fn communication_guide(query: &str) -> String {
    format!(
        "💬 **Travel Communication Guide**

For your communication query: \"{query}\"

**🌍 Universal Polite Phrases:**
• **\"Excuse me, could you please help me?\"**
• **\"I'd like to request...\"**
• **\"Would it be possible to...?\"**
• **\"Thank you so much for your help!\"**

**🏨 Hotel Communication:**
• **Check-in:** \"I have a reservation under [name]\"
• **Requests:** \"Might you have a room with [feature]?\"
• **Problems:** \"I'm having an issue with [problem]. Could you assist?\"

**🍽️ Restaurants:**
• **Dietary needs:** \"I have a [restriction]. What would you recommend?\"
• **Bill:** \"Could I have the check, please?\"

A translation app with camera mode helps with menus and signs."
    )
}

fn decision_framework(query: &str) -> String {
    format!(
        "🧭 **Smart Decision Making**

For your decision challenge: \"{query}\"

**📊 Decision Framework:**
1. **List your priorities** (budget, time, interests, comfort)
2. **Research each option** with a fixed research deadline
3. **Write a short pros/cons list** per option
4. **Rate options 1-10** on your most important factor
5. **Trust your gut** once the analysis is done

**⚡ Breaking Analysis Paralysis:**
• Good enough is perfect: no destination is flawless
• Ask \"What would I regret NOT doing?\"

**🎆 Action Steps:**
1. Give yourself 48 hours to decide
2. Talk to someone who has been there
3. Book it and start planning the details!"
    )
}

fn stress_relief(query: &str) -> String {
    format!(
        "🧘 **Travel Stress Relief**

For your stress management need: \"{query}\"

**🌬️ Immediate Calm Technique (4-4-6 Breathing):**
1. **Inhale** slowly through your nose for 4 counts
2. **Hold** gently for 4 counts
3. **Exhale** slowly through your mouth for 6 counts
4. **Repeat** 5-10 times until centered

**🧘 Travel-Specific Stress Busters:**
• **Planning overwhelm:** focus on ONE task at a time
• **Decision fatigue:** set clear deadlines for choices
• **Fear of the unknown:** a little research builds confidence

**🌱 Mindset Shifts:**
• \"Problems\" become stories
• Perfect plans aren't needed for great memories

Breathe deeply, you've got this journey covered!"
    )
}

fn planning_roadmap(query: &str) -> String {
    format!(
        "📋 **Travel Planning Synthesis**

Synthesizing your travel planning: \"{query}\"

**🎯 Phase 1: Foundation (this week)**
• Confirm destination and rough dates
• Set budget parameters
• Check passport and visa requirements

**✈️ Phase 2: Major Bookings (next 2 weeks)**
• Book flights in a good pricing window
• Reserve accommodation in your preferred area
• Consider travel insurance

**🎨 Phase 3: Experience Design (before the trip)**
• Plan 2-3 must-do activities and leave the rest flexible
• Download offline maps and key apps
• Learn a few local phrases

**Next Action:** pick ONE item from Phase 1 and finish it today!"
    )
}
